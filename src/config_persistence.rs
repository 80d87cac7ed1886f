//! Loading, dotted-key editing and comment-preserving persistence of `config.toml`.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use toml_edit::{DocumentMut, Item, Table, Value};

use crate::config::{sanitize_config, Config};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration directory is available on this platform")]
    NoConfigDir,
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML document: {0}")]
    Document(String),
    #[error("unknown config key '{0}'")]
    UnknownKey(String),
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
    #[error("override '{0}' is not of the form key=value")]
    MalformedOverride(String),
}

pub fn system_config_template_text() -> &'static str {
    include_str!("../config/config.system.toml")
}

fn parse_document(text: &str) -> Result<DocumentMut, ConfigError> {
    text.parse::<DocumentMut>()
        .map_err(|err| ConfigError::Document(err.to_string()))
}

fn read_config_text(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn persist_config_text(path: &Path, text: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the commented template when `path` does not exist yet.
pub fn ensure_config_file(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Ok(());
    }
    debug!(target: "config", "Creating default config at {}", path.display());
    persist_config_text(path, system_config_template_text())
}

/// Reads the config at `path`, creating it first when missing. A file that
/// no longer parses is reported and replaced in memory by the defaults.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    ensure_config_file(path)?;
    let text = read_config_text(path)?;
    let config = match toml::from_str::<Config>(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    };
    Ok(sanitize_config(config))
}

/// Interprets a command-line value: `true`/`false` become booleans, digit
/// strings become integers, other TOML literals (floats, arrays, quoted
/// strings) are parsed, and anything else is kept as a plain string.
pub fn parse_override_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::from(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::from(false);
    }
    if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        if let Ok(number) = trimmed.parse::<i64>() {
            return Value::from(number);
        }
    }
    let looks_literal = trimmed.starts_with(['[', '{', '"', '\''])
        || trimmed.parse::<f64>().is_ok_and(f64::is_finite);
    if looks_literal {
        if let Ok(parsed) = trimmed.parse::<Value>() {
            return parsed;
        }
    }
    Value::from(raw)
}

fn split_key(key: &str) -> Result<Vec<&str>, ConfigError> {
    let parts: Vec<&str> = key.split('.').map(str::trim).collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(ConfigError::UnknownKey(key.to_string()));
    }
    Ok(parts)
}

fn render_item(item: &Item) -> String {
    match item {
        Item::Value(Value::String(text)) => text.value().clone(),
        Item::Value(value) => {
            let mut value = value.clone();
            value.decor_mut().clear();
            value.to_string()
        }
        other => other.to_string().trim().to_string(),
    }
}

/// Looks up a dotted key such as `defaults.lyrics.mode`.
pub fn get_config_value(text: &str, key: &str) -> Result<String, ConfigError> {
    let document = parse_document(text)?;
    let mut current = document.as_item();
    for part in split_key(key)? {
        current = current
            .get(part)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
    }
    Ok(render_item(current))
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, mut value: Value) {
    if let Some(existing_decor) = table
        .get(key)
        .and_then(Item::as_value)
        .map(|current| current.decor().clone())
    {
        *value.decor_mut() = existing_decor;
    }
    table[key] = Item::Value(value);
}

/// Sets a dotted key in the document text, keeping comments and formatting.
/// The result must still deserialize into a `Config`.
pub fn set_config_value(text: &str, key: &str, raw_value: &str) -> Result<String, ConfigError> {
    let mut document = parse_document(text)?;
    let parts = split_key(key)?;
    let Some((leaf, sections)) = parts.split_last() else {
        return Err(ConfigError::UnknownKey(key.to_string()));
    };

    let mut table = document.as_table_mut();
    for section in sections {
        if !table.contains_key(section) {
            table.insert(section, Item::Table(Table::new()));
        }
        table = table
            .get_mut(section)
            .and_then(Item::as_table_mut)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
    }
    set_table_value_preserving_decor(table, leaf, parse_override_value(raw_value));

    let updated = document.to_string();
    toml::from_str::<Config>(&updated).map_err(|err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: err.message().to_string(),
    })?;
    debug!(target: "config", "Set {} = {}", key, raw_value);
    Ok(updated)
}

/// Splits `key=value` on the first `=`.
pub fn split_assignment(assignment: &str) -> Result<(&str, &str), ConfigError> {
    assignment
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim(), value))
        .ok_or_else(|| ConfigError::MalformedOverride(assignment.to_string()))
}

/// Applies `key=value` overrides to an in-memory config for a single run.
pub fn apply_overrides(config: &Config, overrides: &[String]) -> Result<Config, ConfigError> {
    if overrides.is_empty() {
        return Ok(config.clone());
    }
    let mut text = toml::to_string(config).map_err(|err| ConfigError::Document(err.to_string()))?;
    for assignment in overrides {
        let (key, value) = split_assignment(assignment)?;
        text = set_config_value(&text, key, value)?;
    }
    let updated = toml::from_str::<Config>(&text)
        .map_err(|err| ConfigError::Document(err.to_string()))?;
    Ok(sanitize_config(updated))
}

/// Persists a single dotted-key change to the config file at `path`.
pub fn set_config_file_value(path: &Path, key: &str, raw_value: &str) -> Result<(), ConfigError> {
    ensure_config_file(path)?;
    let text = read_config_text(path)?;
    let updated = set_config_value(&text, key, raw_value)?;
    persist_config_text(path, &updated)
}

pub fn get_config_file_value(path: &Path, key: &str) -> Result<String, ConfigError> {
    ensure_config_file(path)?;
    get_config_value(&read_config_text(path)?, key)
}

#[cfg(test)]
mod tests {
    use super::{
        apply_overrides, get_config_value, load_config_file, parse_override_value,
        set_config_file_value, set_config_value, split_assignment, system_config_template_text,
        ConfigError,
    };
    use crate::config::{Config, FeatHandling, LyricsMode};
    use toml_edit::Value;

    #[test]
    fn test_parse_override_value_types() {
        assert!(matches!(parse_override_value("true"), Value::Boolean(_)));
        assert!(matches!(parse_override_value("FALSE"), Value::Boolean(_)));
        assert!(matches!(parse_override_value("42"), Value::Integer(_)));
        assert!(matches!(parse_override_value("0.75"), Value::Float(_)));
        assert!(matches!(parse_override_value(r#"["a", "b"]"#), Value::Array(_)));
        assert!(matches!(parse_override_value("1920x1920"), Value::String(_)));
        assert!(matches!(parse_override_value("split-clean"), Value::String(_)));
    }

    #[test]
    fn test_get_config_value_reads_nested_keys() {
        let text = system_config_template_text();
        assert_eq!(get_config_value(text, "defaults.lyrics.mode").unwrap(), "embed");
        assert_eq!(get_config_value(text, "defaults.rename").unwrap(), "false");
        assert_eq!(get_config_value(text, "separators.artist").unwrap(), "; ");
        assert_eq!(get_config_value(text, "matching.threshold").unwrap(), "0.6");
        assert!(matches!(
            get_config_value(text, "defaults.nope"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_config_value_preserves_comments() {
        let text = system_config_template_text();
        let updated = set_config_value(text, "defaults.rename", "true").unwrap();

        assert!(updated.contains("# Rename files to their track title after tagging."));
        assert!(updated.contains("rename = true"));
        let parsed: Config = toml::from_str(&updated).unwrap();
        assert!(parsed.defaults.rename);
    }

    #[test]
    fn test_set_config_value_rejects_wrong_type() {
        let text = system_config_template_text();
        let result = set_config_value(text, "defaults.lyrics.mode", "sideways");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_set_config_value_creates_missing_tables() {
        let updated = set_config_value("", "api_keys.genius", "abc123").unwrap();
        let parsed: Config = toml::from_str(&updated).unwrap();
        assert_eq!(parsed.api_keys.genius, "abc123");
    }

    #[test]
    fn test_apply_overrides_changes_only_memory_copy() {
        let base = Config::default();
        let overridden = apply_overrides(
            &base,
            &[
                "defaults.feat_handling=keep".to_string(),
                "defaults.lyrics.mode=both".to_string(),
                "matching.threshold=0.8".to_string(),
                "known_artists=[\"Tyler, The Creator\"]".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(overridden.defaults.feat_handling, FeatHandling::Keep);
        assert_eq!(overridden.defaults.lyrics.mode, LyricsMode::Both);
        assert!((overridden.matching.threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(overridden.known_artists, vec!["Tyler, The Creator".to_string()]);
        assert_eq!(base, Config::default());
    }

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("a.b=c=d").unwrap(), ("a.b", "c=d"));
        assert!(split_assignment("novalue").is_err());
        assert!(split_assignment("=x").is_err());
    }

    #[test]
    fn test_load_config_file_creates_template_and_round_trips_set() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("swisstag").join("config.toml");

        let loaded = load_config_file(&path).expect("config should load");
        assert_eq!(loaded, Config::default());
        assert!(path.exists());

        set_config_file_value(&path, "separators.artist", " / ").unwrap();
        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded.separators.artist, " / ");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# swisstag configuration."));
    }

    #[test]
    fn test_load_config_file_falls_back_on_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "defaults = 3").unwrap();

        assert_eq!(load_config_file(&path).unwrap(), Config::default());
    }
}

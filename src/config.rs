//! Persistent tagging configuration model and defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::warn;

use crate::reconcile::DEFAULT_MATCH_THRESHOLD;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Behaviour toggles applied when the matching CLI flag is absent.
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub separators: SeparatorsConfig,
    #[serde(default)]
    pub regex: RegexConfig,
    /// Group name to member list. Lookup is case-insensitive.
    #[serde(default = "default_artist_groups")]
    pub artist_groups: BTreeMap<String, Vec<String>>,
    /// Names that must never be split on `,` or `&`.
    #[serde(default)]
    pub known_artists: Vec<String>,
    /// Genres ignored when picking a release genre, compared case-insensitively.
    #[serde(default = "default_blacklisted_genres")]
    pub blacklisted_genres: Vec<String>,
    #[serde(default)]
    pub api_keys: ApiKeysConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub rename: bool,
    #[serde(default = "default_true")]
    pub match_filename: bool,
    #[serde(default)]
    pub feat_handling: FeatHandling,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub cover: CoverConfig,
}

/// How featured-artist credits in titles are treated.
#[derive(
    Debug,
    Clone,
    Copy,
    serde::Deserialize,
    serde::Serialize,
    PartialEq,
    Eq,
    Default,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FeatHandling {
    /// Leave title and artists untouched.
    Keep,
    /// Move features into the artist list and prefix the title with `! `.
    #[default]
    Split,
    /// Move features into the artist list and leave the title clean.
    SplitClean,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LyricsConfig {
    #[serde(default = "default_true")]
    pub fetch: bool,
    #[serde(default)]
    pub mode: LyricsMode,
}

/// Where fetched lyrics end up.
#[derive(
    Debug,
    Clone,
    Copy,
    serde::Deserialize,
    serde::Serialize,
    PartialEq,
    Eq,
    Default,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum LyricsMode {
    /// Inside the audio file's tag.
    #[default]
    Embed,
    /// In a sidecar `.lrc` file.
    Lrc,
    Both,
}

impl LyricsMode {
    pub fn embeds(self) -> bool {
        matches!(self, Self::Embed | Self::Both)
    }

    pub fn writes_lrc(self) -> bool {
        matches!(self, Self::Lrc | Self::Both)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CoverConfig {
    /// Maximum saved cover size as `WIDTHxHEIGHT`.
    #[serde(default = "default_cover_size")]
    pub size: String,
    /// Keep the full-size original next to the downscaled cover.
    #[serde(default = "default_true")]
    pub keep_resized: bool,
    #[serde(default)]
    pub extract: CoverExtractConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CoverExtractConfig {
    #[serde(default)]
    pub crop: bool,
    #[serde(default = "default_true")]
    pub scale: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SeparatorsConfig {
    #[serde(default = "default_separator")]
    pub artist: String,
    #[serde(default = "default_separator")]
    pub genre: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RegexConfig {
    /// Capture group 1 must hold the featured-artist list.
    #[serde(default = "default_featured_artist_pattern")]
    pub featured_artist: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ApiKeysConfig {
    /// Fallback when the OS keyring has no token.
    #[serde(default)]
    pub genius: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MatchingConfig {
    /// Minimum similarity for an automatic file-to-track match, inclusive.
    #[serde(default = "default_match_threshold")]
    pub threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            separators: SeparatorsConfig::default(),
            regex: RegexConfig::default(),
            artist_groups: default_artist_groups(),
            known_artists: Vec::new(),
            blacklisted_genres: default_blacklisted_genres(),
            api_keys: ApiKeysConfig::default(),
            matching: MatchingConfig::default(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            rename: false,
            match_filename: true,
            feat_handling: FeatHandling::default(),
            lyrics: LyricsConfig::default(),
            cover: CoverConfig::default(),
        }
    }
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            fetch: true,
            mode: LyricsMode::default(),
        }
    }
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            size: default_cover_size(),
            keep_resized: true,
            extract: CoverExtractConfig::default(),
        }
    }
}

impl Default for CoverExtractConfig {
    fn default() -> Self {
        Self {
            crop: false,
            scale: true,
        }
    }
}

impl Default for SeparatorsConfig {
    fn default() -> Self {
        Self {
            artist: default_separator(),
            genre: default_separator(),
        }
    }
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            featured_artist: default_featured_artist_pattern(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_match_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cover_size() -> String {
    "1920x1920".to_string()
}

fn default_separator() -> String {
    "; ".to_string()
}

fn default_featured_artist_pattern() -> String {
    r"(?i)[(\[](?:feat|ft|featuring|with)\.?\s+(.*?)[)\]]".to_string()
}

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_blacklisted_genres() -> Vec<String> {
    vec!["soundtrack".to_string()]
}

pub fn default_artist_groups() -> BTreeMap<String, Vec<String>> {
    [
        ("AllttA", &["20syl", "Mr. J. Medeiros"][..]),
        ("Nirvana", &["Kurt Cobain", "Krist Novoselic", "Dave Grohl"][..]),
        (
            "The Rare Occasions",
            &["Brian McLaughlin", "Luke Imbusch", "Jeremy Cohen"][..],
        ),
        ("KIDS SEE GHOSTS", &["Kanye West", "Kid Cudi"][..]),
        ("Watch The Throne", &["Kanye West", "Jay-Z"][..]),
        ("Sunday Service Choir", &["Kanye West"][..]),
        ("¥$", &["Kanye West", "Ty Dolla $ign"][..]),
        ("Oddisee", &["Amir Mohamed el Khalifa"][..]),
    ]
    .into_iter()
    .map(|(group, members)| {
        (
            group.to_string(),
            members.iter().map(|member| member.to_string()).collect(),
        )
    })
    .collect()
}

/// `<config dir>/swisstag/config.toml`, when the platform has a config dir.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("swisstag").join("config.toml"))
}

/// Repairs values that would otherwise fail later at use sites.
pub fn sanitize_config(mut config: Config) -> Config {
    let threshold = config.matching.threshold;
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        warn!(
            "matching.threshold {} is outside [0, 1]; using {}",
            threshold, DEFAULT_MATCH_THRESHOLD
        );
        config.matching.threshold = DEFAULT_MATCH_THRESHOLD;
    }
    if regex::Regex::new(&config.regex.featured_artist).is_err() {
        warn!(
            "regex.featured_artist '{}' does not compile; using the default pattern",
            config.regex.featured_artist
        );
        config.regex.featured_artist = default_featured_artist_pattern();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config, FeatHandling, LyricsMode};

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert!(!config.defaults.rename);
        assert!(config.defaults.match_filename);
        assert_eq!(config.defaults.feat_handling, FeatHandling::Split);
        assert!(config.defaults.lyrics.fetch);
        assert_eq!(config.defaults.lyrics.mode, LyricsMode::Embed);
        assert_eq!(config.defaults.cover.size, "1920x1920");
        assert!(config.defaults.cover.keep_resized);
        assert!(!config.defaults.cover.extract.crop);
        assert!(config.defaults.cover.extract.scale);
        assert_eq!(config.separators.artist, "; ");
        assert_eq!(config.separators.genre, "; ");
        assert_eq!(config.artist_groups.len(), 8);
        assert_eq!(
            config.artist_groups["AllttA"],
            vec!["20syl".to_string(), "Mr. J. Medeiros".to_string()]
        );
        assert!(config.known_artists.is_empty());
        assert_eq!(config.blacklisted_genres, vec!["soundtrack".to_string()]);
        assert!(config.api_keys.genius.is_empty());
        assert!((config.matching.threshold - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_config_deserialization_fills_defaults() {
        let partial = r#"
[defaults]
rename = true
feat_handling = "split-clean"

[defaults.lyrics]
mode = "both"
"#;

        let parsed: Config = toml::from_str(partial).expect("config should parse");
        assert!(parsed.defaults.rename);
        assert!(parsed.defaults.match_filename);
        assert_eq!(parsed.defaults.feat_handling, FeatHandling::SplitClean);
        assert_eq!(parsed.defaults.lyrics.mode, LyricsMode::Both);
        assert!(parsed.defaults.lyrics.fetch);
        assert_eq!(parsed.defaults.cover.size, "1920x1920");
        assert_eq!(parsed.artist_groups, Config::default().artist_groups);
    }

    #[test]
    fn test_system_config_template_matches_default_values() {
        let parsed: Config = toml::from_str(include_str!("../config/config.system.toml"))
            .expect("system config template should parse");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_lyrics_mode_targets() {
        assert!(LyricsMode::Embed.embeds());
        assert!(!LyricsMode::Embed.writes_lrc());
        assert!(!LyricsMode::Lrc.embeds());
        assert!(LyricsMode::Lrc.writes_lrc());
        assert!(LyricsMode::Both.embeds() && LyricsMode::Both.writes_lrc());
    }

    #[test]
    fn test_sanitize_config_repairs_threshold_and_pattern() {
        let mut config = Config::default();
        config.matching.threshold = 1.5;
        config.regex.featured_artist = "(unclosed".to_string();

        let sanitized = sanitize_config(config);
        assert!((sanitized.matching.threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(
            sanitized.regex.featured_artist,
            Config::default().regex.featured_artist
        );
    }
}

//! Text normalization shared by both sides of the reconciler.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

static BRACKETED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("bracketed tag pattern should compile"));

static LEADING_TRACK_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,3})(?:\s*[-._)]\s*|\s+)").expect("track number pattern should compile")
});

/// Folds case and diacritics, replaces punctuation with spaces, and collapses whitespace.
pub fn normalize_title(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    for ch in value.nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            normalized.extend(ch.to_lowercase());
        } else if ch == '\'' || ch == '\u{2019}' {
            // "Don't" and "Dont" should compare equal.
            continue;
        } else {
            normalized.push(' ');
        }
    }
    collapse_whitespace(&normalized)
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sorts whitespace-separated tokens so word order stops mattering.
pub fn sort_tokens(normalized: &str) -> String {
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Leading track number in a file stem such as `03 - Title` or `7. Title`.
pub fn leading_track_number(stem: &str) -> Option<u32> {
    LEADING_TRACK_NUMBER
        .captures(stem)
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse::<u32>().ok())
}

/// Strips bracketed tags and the leading track number from a file stem.
pub fn clean_file_stem(stem: &str) -> String {
    let without_tags = BRACKETED_TAG.replace_all(stem, " ");
    let without_number = LEADING_TRACK_NUMBER.replace(without_tags.trim_start(), "");
    let cleaned = collapse_whitespace(&without_number);
    if cleaned.is_empty() {
        collapse_whitespace(&without_tags)
    } else {
        cleaned
    }
}

/// Human-readable title guessed from a file path.
pub fn infer_title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    clean_file_stem(&stem.replace('_', " "))
}

#[cfg(test)]
mod tests {
    use super::{
        clean_file_stem, infer_title_from_path, leading_track_number, normalize_title, sort_tokens,
    };
    use std::path::Path;

    #[test]
    fn test_normalize_title_folds_case_punctuation_and_diacritics() {
        assert_eq!(normalize_title("  Beyoncé -- Déjà   Vu!! "), "beyonce deja vu");
        assert_eq!(normalize_title("Don't Stop (Live)"), "dont stop live");
    }

    #[test]
    fn test_normalize_title_keeps_non_latin_letters() {
        assert_eq!(normalize_title("東京 Night"), "東京 night");
    }

    #[test]
    fn test_sort_tokens_orders_words() {
        assert_eq!(sort_tokens("rare the occasions"), "occasions rare the");
    }

    #[test]
    fn test_leading_track_number_variants() {
        assert_eq!(leading_track_number("01 intro"), Some(1));
        assert_eq!(leading_track_number("02 - Rare Occasions"), Some(2));
        assert_eq!(leading_track_number("7. Seven"), Some(7));
        assert_eq!(leading_track_number("trackX"), None);
        assert_eq!(leading_track_number("1999"), None);
    }

    #[test]
    fn test_clean_file_stem_drops_tags_and_number() {
        assert_eq!(clean_file_stem("03 - Song [320kbps]"), "Song");
        assert_eq!(clean_file_stem("[FLAC] 12.Last One"), "Last One");
    }

    #[test]
    fn test_clean_file_stem_keeps_numeric_only_title() {
        assert_eq!(clean_file_stem("1999"), "1999");
    }

    #[test]
    fn test_infer_title_from_path_uses_stem() {
        assert_eq!(
            infer_title_from_path(Path::new("/music/A/B/02 rare_ocasions.mp3")),
            "rare ocasions"
        );
    }
}

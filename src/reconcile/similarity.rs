//! Pairwise title similarity.
//!
//! The score is the better of the normalized Levenshtein similarity of the two
//! normalized titles and of their token-sorted forms, so `Occasions Rare` and
//! `Rare Occasions` score 1.0 while a single-letter typo in a long title stays
//! close to 1.0. Inputs are expected to be already normalized.

use super::normalize::sort_tokens;

/// Similarity in `[0, 1]` between two normalized titles.
pub fn title_similarity(left: &str, right: &str) -> f64 {
    if left.is_empty() && right.is_empty() {
        return 0.0;
    }
    if left == right {
        return 1.0;
    }
    let direct = strsim::normalized_levenshtein(left, right);
    let sorted = strsim::normalized_levenshtein(&sort_tokens(left), &sort_tokens(right));
    direct.max(sorted).clamp(0.0, 1.0)
}

/// Distance between a file's leading number and an entry position.
pub fn position_distance(file_number: Option<u32>, entry_position: u32) -> Option<u32> {
    file_number.map(|number| number.abs_diff(entry_position))
}

/// Absolute duration difference in whole seconds when both sides know it.
pub fn duration_distance(left_secs: Option<u32>, right_secs: Option<u32>) -> Option<u32> {
    match (left_secs, right_secs) {
        (Some(left), Some(right)) => Some(left.abs_diff(right)),
        _ => None,
    }
}

//! Greedy one-to-one assignment over the entry × file similarity matrix.
//!
//! Candidates are visited best-first and accepted when both sides are still
//! free and the score reaches the threshold. This is a greedy approximation of
//! maximum-weight bipartite matching: a locally best pair can block two pairs
//! whose combined score would have been higher. For album-sized inputs with
//! mostly distinct titles the difference does not show up in practice.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use log::debug;

use super::normalize::normalize_title;
use super::similarity::{duration_distance, position_distance, title_similarity};
use super::{
    Assignment, LocalFile, MatchBasis, MatchOptions, MatchStrategy, ReconcileError,
    Reconciliation, TracklistEntry,
};

#[derive(Debug, Clone, Copy)]
struct Candidate {
    entry_index: usize,
    file_index: usize,
    score: f64,
    exact: bool,
    position_distance: Option<u32>,
    duration_distance: Option<u32>,
}

/// Matches `entries` against `files`, returning the assignments and both
/// unresolved sides. Identical inputs always produce identical outputs,
/// independent of the order `files` is given in.
pub fn reconcile(
    entries: &[TracklistEntry],
    files: &[LocalFile],
    options: &MatchOptions,
) -> Result<Reconciliation, ReconcileError> {
    validate_inputs(entries, files, options)?;

    let mut entries = entries.to_vec();
    entries.sort_by_key(|entry| entry.position);
    let mut files = files.to_vec();
    files.sort_by(|left, right| left.path.cmp(&right.path));

    if entries.is_empty() || files.is_empty() {
        return Ok(Reconciliation {
            unresolved_entries: entries,
            unresolved_files: files,
            ..Reconciliation::default()
        });
    }

    let mut candidates = score_candidates(&entries, &files);
    candidates.sort_by(|left, right| compare_candidates(left, right, &entries, &files));

    let accepted = if options.strategy == MatchStrategy::Positional && entries.len() == files.len()
    {
        positional_pairs(&candidates, entries.len(), files.len(), options.threshold)
    } else {
        if options.strategy == MatchStrategy::Positional {
            debug!(
                target: "vars",
                "Positional matching needs equal counts ({} entries, {} files); using fuzzy matching",
                entries.len(),
                files.len()
            );
        }
        greedy_pairs(&candidates, entries.len(), files.len(), options.threshold)
    };

    for (candidate, basis) in &accepted {
        debug!(
            target: "vars",
            "Matched '{}' -> '{}' (confidence {:.3}, {:?})",
            files[candidate.file_index].file_name(),
            entries[candidate.entry_index].title,
            candidate.score,
            basis
        );
    }
    Ok(collect_reconciliation(entries, files, accepted))
}

/// Best-first walk over the sorted candidates.
fn greedy_pairs(
    candidates: &[Candidate],
    entry_count: usize,
    file_count: usize,
    threshold: f64,
) -> Vec<(Candidate, MatchBasis)> {
    let mut taken_entries = vec![false; entry_count];
    let mut taken_files = vec![false; file_count];
    let mut accepted = Vec::new();
    for candidate in candidates {
        if taken_entries[candidate.entry_index] || taken_files[candidate.file_index] {
            continue;
        }
        if candidate.score < threshold {
            // Candidates are sorted best-first, so nothing after this can pass.
            break;
        }
        taken_entries[candidate.entry_index] = true;
        taken_files[candidate.file_index] = true;
        accepted.push((*candidate, MatchBasis::Fuzzy));
    }
    accepted
}

/// Exact title matches are taken first wherever they sit. The remaining
/// entries (by position) and files (by path) are then paired in order, and a
/// pair is kept only when its own title score reaches the threshold.
fn positional_pairs(
    candidates: &[Candidate],
    entry_count: usize,
    file_count: usize,
    threshold: f64,
) -> Vec<(Candidate, MatchBasis)> {
    let mut taken_entries = vec![false; entry_count];
    let mut taken_files = vec![false; file_count];
    let mut accepted = Vec::new();
    for candidate in candidates.iter().filter(|candidate| candidate.exact) {
        if taken_entries[candidate.entry_index] || taken_files[candidate.file_index] {
            continue;
        }
        taken_entries[candidate.entry_index] = true;
        taken_files[candidate.file_index] = true;
        accepted.push((*candidate, MatchBasis::Fuzzy));
    }

    let free_entries = (0..entry_count).filter(|index| !taken_entries[*index]);
    let free_files: Vec<usize> = (0..file_count).filter(|index| !taken_files[*index]).collect();
    for (entry_index, file_index) in free_entries.zip(free_files) {
        let Some(candidate) = candidates.iter().find(|candidate| {
            candidate.entry_index == entry_index && candidate.file_index == file_index
        }) else {
            continue;
        };
        if candidate.score >= threshold {
            accepted.push((*candidate, MatchBasis::Positional));
        }
    }
    accepted
}

/// Turns accepted pairs into assignments in entry order; everything else is unresolved.
fn collect_reconciliation(
    entries: Vec<TracklistEntry>,
    files: Vec<LocalFile>,
    mut accepted: Vec<(Candidate, MatchBasis)>,
) -> Reconciliation {
    accepted.sort_by_key(|(candidate, _)| entries[candidate.entry_index].position);
    let mut taken_entries = vec![false; entries.len()];
    let mut taken_files = vec![false; files.len()];
    let assignments = accepted
        .iter()
        .map(|(candidate, basis)| {
            taken_entries[candidate.entry_index] = true;
            taken_files[candidate.file_index] = true;
            Assignment {
                entry: entries[candidate.entry_index].clone(),
                file: files[candidate.file_index].clone(),
                confidence: candidate.score,
                basis: *basis,
            }
        })
        .collect();

    let unresolved_entries = entries
        .into_iter()
        .zip(taken_entries)
        .filter_map(|(entry, taken)| (!taken).then_some(entry))
        .collect();
    let unresolved_files = files
        .into_iter()
        .zip(taken_files)
        .filter_map(|(file, taken)| (!taken).then_some(file))
        .collect();

    Reconciliation {
        assignments,
        unresolved_entries,
        unresolved_files,
        skipped_files: Vec::new(),
    }
}

fn validate_inputs(
    entries: &[TracklistEntry],
    files: &[LocalFile],
    options: &MatchOptions,
) -> Result<(), ReconcileError> {
    if !options.threshold.is_finite() || !(0.0..=1.0).contains(&options.threshold) {
        return Err(ReconcileError::InvalidThreshold(options.threshold));
    }

    let mut positions = BTreeSet::new();
    for entry in entries {
        if entry.position == 0 {
            return Err(ReconcileError::InvalidPosition {
                title: entry.title.clone(),
            });
        }
        if !positions.insert(entry.position) {
            return Err(ReconcileError::DuplicatePosition(entry.position));
        }
    }

    let mut paths = BTreeSet::new();
    for file in files {
        if !paths.insert(file.path.as_path()) {
            return Err(ReconcileError::DuplicateFile(file.path.clone()));
        }
    }
    Ok(())
}

/// Names a file may be known by: its cleaned file name, then its existing title tag.
fn file_title_variants(file: &LocalFile) -> Vec<String> {
    let mut variants = vec![normalize_title(&file.inferred_title)];
    if let Some(tag_title) = file
        .existing_tags
        .as_ref()
        .map(|tags| normalize_title(&tags.title))
    {
        if !tag_title.is_empty() && !variants.contains(&tag_title) {
            variants.push(tag_title);
        }
    }
    variants.retain(|variant| !variant.is_empty());
    variants
}

fn score_candidates(entries: &[TracklistEntry], files: &[LocalFile]) -> Vec<Candidate> {
    let entry_titles: Vec<String> = entries
        .iter()
        .map(|entry| normalize_title(&entry.title))
        .collect();
    let file_titles: Vec<Vec<String>> = files.iter().map(file_title_variants).collect();

    let mut candidates = Vec::with_capacity(entries.len() * files.len());
    for (entry_index, entry) in entries.iter().enumerate() {
        let entry_title = &entry_titles[entry_index];
        for (file_index, file) in files.iter().enumerate() {
            let variants = &file_titles[file_index];
            let exact = !entry_title.is_empty() && variants.iter().any(|v| v == entry_title);
            let score = if exact {
                1.0
            } else {
                variants
                    .iter()
                    .map(|variant| title_similarity(entry_title, variant))
                    .fold(0.0, f64::max)
            };
            candidates.push(Candidate {
                entry_index,
                file_index,
                score,
                exact,
                position_distance: position_distance(file.track_number, entry.position),
                duration_distance: duration_distance(entry.duration_secs, file.duration_secs),
            });
        }
    }
    candidates
}

/// Known distances sort before unknown ones.
fn compare_known_first(left: Option<u32>, right: Option<u32>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_candidates(
    left: &Candidate,
    right: &Candidate,
    entries: &[TracklistEntry],
    files: &[LocalFile],
) -> Ordering {
    right
        .exact
        .cmp(&left.exact)
        .then_with(|| right.score.total_cmp(&left.score))
        .then_with(|| compare_known_first(left.position_distance, right.position_distance))
        .then_with(|| compare_known_first(left.duration_distance, right.duration_distance))
        .then_with(|| {
            entries[left.entry_index]
                .position
                .cmp(&entries[right.entry_index].position)
        })
        .then_with(|| {
            files[left.file_index]
                .path
                .cmp(&files[right.file_index].path)
        })
}

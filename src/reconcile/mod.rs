//! Tracklist reconciliation: pairs a canonical album tracklist with local files.

mod matcher;
pub mod normalize;
pub mod similarity;

use std::path::{Path, PathBuf};

use crate::metadata::metadata_tags::CommonTrackMetadata;

pub use matcher::reconcile;

/// Default minimum similarity for an automatic match. Scores equal to the
/// threshold are accepted.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

/// One canonical track as reported by the tracklist provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracklistEntry {
    pub position: u32,
    pub title: String,
    pub duration_secs: Option<u32>,
    /// Provider song id, used later to fetch lyrics.
    pub song_id: Option<u64>,
    /// Per-track artist credit as printed by the provider.
    pub artist: Option<String>,
}

impl TracklistEntry {
    pub fn new(position: u32, title: impl Into<String>) -> Self {
        Self {
            position,
            title: title.into(),
            duration_secs: None,
            song_id: None,
            artist: None,
        }
    }
}

/// A local audio file considered for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub inferred_title: String,
    /// Leading number in the file name, when present.
    pub track_number: Option<u32>,
    pub duration_secs: Option<u32>,
    pub existing_tags: Option<CommonTrackMetadata>,
}

impl LocalFile {
    /// Builds a file record from its path alone, without touching the disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            inferred_title: normalize::infer_title_from_path(&path),
            track_number: normalize::leading_track_number(&stem),
            duration_secs: None,
            existing_tags: None,
            path,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Why a pair ended up in the assignment set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBasis {
    Fuzzy,
    Positional,
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub entry: TracklistEntry,
    pub file: LocalFile,
    pub confidence: f64,
    pub basis: MatchBasis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Similarity-based matching of file names against titles.
    #[default]
    Fuzzy,
    /// Pair files in path order with entries in position order when the counts
    /// agree, after exact title matches are taken out. Each pair still has to
    /// reach the threshold. Falls back to `Fuzzy` when the counts differ.
    Positional,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    pub threshold: f64,
    pub strategy: MatchStrategy,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            strategy: MatchStrategy::Fuzzy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("tracklist entry '{title}' has invalid position 0")]
    InvalidPosition { title: String },
    #[error("tracklist position {0} appears more than once")]
    DuplicatePosition(u32),
    #[error("file {} appears more than once", .0.display())]
    DuplicateFile(PathBuf),
    #[error("match threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),
    #[error("no unresolved tracklist entry at position {0}")]
    UnknownEntry(u32),
    #[error("file {} is not awaiting manual resolution", .0.display())]
    UnknownFile(PathBuf),
}

/// A decision returned by the manual-resolution collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualDecision {
    Assign { file: PathBuf, entry_position: u32 },
    Skip { file: PathBuf },
}

/// Output of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    /// Ordered by entry position.
    pub assignments: Vec<Assignment>,
    /// Ordered by position.
    pub unresolved_entries: Vec<TracklistEntry>,
    /// Ordered by path.
    pub unresolved_files: Vec<LocalFile>,
    /// Files the user explicitly chose not to match.
    pub skipped_files: Vec<LocalFile>,
}

impl Reconciliation {
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved_files.is_empty() || self.unresolved_entries.is_empty()
    }

    pub fn needs_manual_resolution(&self) -> bool {
        !self.is_fully_resolved()
    }

    /// Commits one manual decision. The pair must come from the unresolved
    /// sets, so a manual match can never break the one-to-one mapping.
    pub fn apply_decision(&mut self, decision: &ManualDecision) -> Result<(), ReconcileError> {
        match decision {
            ManualDecision::Skip { file } => {
                let file_index = self.unresolved_file_index(file)?;
                let skipped = self.unresolved_files.remove(file_index);
                self.skipped_files.push(skipped);
                Ok(())
            }
            ManualDecision::Assign {
                file,
                entry_position,
            } => {
                let file_index = self.unresolved_file_index(file)?;
                let entry_index = self
                    .unresolved_entries
                    .iter()
                    .position(|entry| entry.position == *entry_position)
                    .ok_or(ReconcileError::UnknownEntry(*entry_position))?;
                let file = self.unresolved_files.remove(file_index);
                let entry = self.unresolved_entries.remove(entry_index);
                let insert_at = self
                    .assignments
                    .partition_point(|existing| existing.entry.position < entry.position);
                self.assignments.insert(
                    insert_at,
                    Assignment {
                        entry,
                        file,
                        confidence: 1.0,
                        basis: MatchBasis::Manual,
                    },
                );
                Ok(())
            }
        }
    }

    /// Applies decisions in order. Rejected decisions are returned with their
    /// error and leave the reconciliation untouched.
    pub fn apply_manual(
        &mut self,
        decisions: &[ManualDecision],
    ) -> Vec<(ManualDecision, ReconcileError)> {
        decisions
            .iter()
            .filter_map(|decision| {
                self.apply_decision(decision)
                    .err()
                    .map(|error| (decision.clone(), error))
            })
            .collect()
    }

    fn unresolved_file_index(&self, path: &Path) -> Result<usize, ReconcileError> {
        self.unresolved_files
            .iter()
            .position(|file| file.path == path)
            .ok_or_else(|| ReconcileError::UnknownFile(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        reconcile, LocalFile, ManualDecision, MatchBasis, MatchOptions, ReconcileError,
        TracklistEntry,
    };
    use std::path::PathBuf;

    #[test]
    fn test_local_file_from_path_parses_number_and_title() {
        let file = LocalFile::from_path("/music/05 - Some Song.flac");
        assert_eq!(file.track_number, Some(5));
        assert_eq!(file.inferred_title, "Some Song");
        assert_eq!(file.file_name(), "05 - Some Song.flac");
    }

    #[test]
    fn test_apply_decision_assigns_from_unresolved_sets() {
        let entries = vec![
            TracklistEntry::new(1, "Alpha"),
            TracklistEntry::new(2, "Completely Different"),
        ];
        let files = vec![
            LocalFile::from_path("/a/01 alpha.mp3"),
            LocalFile::from_path("/a/zzz.mp3"),
        ];
        let mut result = reconcile(&entries, &files, &MatchOptions::default()).unwrap();
        assert_eq!(result.assignments.len(), 1);
        assert!(result.needs_manual_resolution());

        result
            .apply_decision(&ManualDecision::Assign {
                file: PathBuf::from("/a/zzz.mp3"),
                entry_position: 2,
            })
            .expect("manual assignment should succeed");

        assert_eq!(result.assignments.len(), 2);
        assert_eq!(result.assignments[1].basis, MatchBasis::Manual);
        assert_eq!(result.assignments[1].confidence, 1.0);
        assert!(result.unresolved_entries.is_empty());
        assert!(result.unresolved_files.is_empty());
    }

    #[test]
    fn test_apply_decision_rejects_already_assigned_sides() {
        let entries = vec![TracklistEntry::new(1, "Alpha"), TracklistEntry::new(2, "Beta")];
        let files = vec![
            LocalFile::from_path("/a/alpha.mp3"),
            LocalFile::from_path("/a/unrelated.mp3"),
        ];
        let mut result = reconcile(&entries, &files, &MatchOptions::default()).unwrap();

        let taken_entry = result.apply_decision(&ManualDecision::Assign {
            file: PathBuf::from("/a/unrelated.mp3"),
            entry_position: 1,
        });
        assert_eq!(taken_entry, Err(ReconcileError::UnknownEntry(1)));

        let taken_file = result.apply_decision(&ManualDecision::Assign {
            file: PathBuf::from("/a/alpha.mp3"),
            entry_position: 2,
        });
        assert_eq!(
            taken_file,
            Err(ReconcileError::UnknownFile(PathBuf::from("/a/alpha.mp3")))
        );
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.unresolved_files.len(), 1);
    }

    #[test]
    fn test_apply_manual_reports_rejected_decisions() {
        let entries = vec![TracklistEntry::new(1, "Alpha"), TracklistEntry::new(2, "Beta")];
        let files = vec![
            LocalFile::from_path("/a/one.mp3"),
            LocalFile::from_path("/a/two.mp3"),
        ];
        let mut result = reconcile(&entries, &files, &MatchOptions::default()).unwrap();
        assert!(result.assignments.is_empty());

        let rejected = result.apply_manual(&[
            ManualDecision::Assign {
                file: PathBuf::from("/a/one.mp3"),
                entry_position: 2,
            },
            ManualDecision::Assign {
                file: PathBuf::from("/a/two.mp3"),
                entry_position: 2,
            },
            ManualDecision::Skip {
                file: PathBuf::from("/a/two.mp3"),
            },
        ]);

        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].1, ReconcileError::UnknownEntry(2));
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].entry.position, 2);
        assert_eq!(result.skipped_files.len(), 1);
        assert_eq!(result.unresolved_entries.len(), 1);
    }

    #[test]
    fn test_apply_decision_skip_moves_file_aside() {
        let entries = vec![TracklistEntry::new(1, "Alpha")];
        let files = vec![LocalFile::from_path("/a/noise.mp3")];
        let mut result = reconcile(&entries, &files, &MatchOptions::default()).unwrap();

        result
            .apply_decision(&ManualDecision::Skip {
                file: PathBuf::from("/a/noise.mp3"),
            })
            .unwrap();

        assert!(result.unresolved_files.is_empty());
        assert_eq!(result.skipped_files.len(), 1);
        assert_eq!(result.unresolved_entries.len(), 1);
        assert!(result.assignments.is_empty());
    }
}

use std::path::{Path, PathBuf};

use log::debug;

use crate::metadata::metadata_tags;
use crate::reconcile::LocalFile;

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 7] =
    ["mp3", "flac", "m4a", "ogg", "wav", "aac", "mp4"];

pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Lists supported audio files directly inside `folder_path`, sorted by path.
pub fn list_album_files(folder_path: &Path) -> Result<Vec<PathBuf>, String> {
    if !folder_path.is_dir() {
        return Err(format!("{} is not a directory", folder_path.display()));
    }
    let entries = std::fs::read_dir(folder_path)
        .map_err(|err| format!("Failed to read directory {}: {}", folder_path.display(), err))?;

    let mut tracks = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(
                    "Failed to read a directory entry in {}: {}",
                    folder_path.display(),
                    err
                );
                continue;
            }
        };
        let path = entry.path();
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() && is_supported_audio_file(&path) => {
                tracks.push(path)
            }
            Ok(_) => {}
            Err(err) => debug!("Failed to inspect {}: {}", path.display(), err),
        }
    }

    tracks.sort_unstable();
    Ok(tracks)
}

/// Builds a `LocalFile` and fills in duration and existing tags from disk.
pub fn describe_local_file(path: &Path) -> LocalFile {
    let mut file = LocalFile::from_path(path);
    let probed = metadata_tags::probe_file(path);
    file.duration_secs = probed.duration_secs;
    file.existing_tags = probed.tags;
    file
}

/// Scans an album directory into matchable file records.
pub fn scan_album_directory(folder_path: &Path) -> Result<Vec<LocalFile>, String> {
    let files = list_album_files(folder_path)?
        .iter()
        .map(|path| describe_local_file(path))
        .collect::<Vec<_>>();
    debug!(target: "vars", "Scanned {} audio files in {}", files.len(), folder_path.display());
    Ok(files)
}

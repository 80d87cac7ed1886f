//! Filesystem side effects after tagging: directory inference, renaming,
//! sorting into artist/album folders, and `.lrc` sidecars.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

static SINGLE_STEM_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[.*?\]|^\d+\s*-\s*").expect("single stem pattern should compile")
});

const FORBIDDEN_FILE_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Logs the shell equivalent of a filesystem operation on the `cmd` channel.
pub fn log_command(command: &str) {
    debug!(target: "cmd", "{}", command);
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Artist and album guessed from the last two directory names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredDirs {
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// For a file, its parent is the album directory; a directory is taken as the
/// album directory itself. The artist is the album directory's parent.
pub fn infer_dirs(path: &Path) -> InferredDirs {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let album_dir = if resolved.is_dir() {
        resolved.as_path()
    } else {
        resolved.parent().unwrap_or(resolved.as_path())
    };
    let names: Vec<String> = album_dir
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    match names.as_slice() {
        [.., artist, album] => InferredDirs {
            artist: Some(artist.clone()),
            album: Some(album.clone()),
        },
        _ => InferredDirs::default(),
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !FORBIDDEN_FILE_NAME_CHARS.contains(ch))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Title guess for single-file mode: the stem without bracketed tags or a
/// leading `NN - ` prefix.
pub fn clean_single_stem(stem: &str) -> String {
    SINGLE_STEM_NOISE.replace_all(stem, "").trim().to_string()
}

/// Renames `file` to `<title><ext>` in the same directory and returns the new path.
pub fn rename_to_title(file: &Path, title: &str, dry_run: bool) -> Result<PathBuf, String> {
    let clean_title = sanitize_file_name(title);
    if clean_title.is_empty() {
        return Ok(file.to_path_buf());
    }
    let file_name = match file.extension() {
        Some(ext) => format!("{}.{}", clean_title, ext.to_string_lossy()),
        None => clean_title,
    };
    let target = file.with_file_name(file_name);
    if target == file {
        return Ok(target);
    }
    log_command(&format!("mv {} {}", shell_quote(file), shell_quote(&target)));
    if dry_run {
        return Ok(target);
    }
    if target.exists() {
        return Err(format!("rename target {} already exists", target.display()));
    }
    fs::rename(file, &target).map_err(|err| format!("Rename failed: {err}"))?;
    Ok(target)
}

fn move_file(source: &Path, target: &Path) -> Result<(), String> {
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    fs::copy(source, target)
        .and_then(|_| fs::remove_file(source))
        .map_err(|err| format!("failed to move {}: {}", source.display(), err))
}

/// Moves `file` to `<album dir parent>/<artist>/<album>/`.
pub fn autosort(file: &Path, artist: &str, album: &str, dry_run: bool) -> Result<PathBuf, String> {
    let artist = match sanitize_file_name(artist) {
        artist if artist.is_empty() => "Unknown".to_string(),
        artist => artist,
    };
    let album = match sanitize_file_name(album) {
        album if album.is_empty() => "Unknown Album".to_string(),
        album => album,
    };
    let library_root = file
        .parent()
        .and_then(Path::parent)
        .ok_or_else(|| format!("{} has no library root to sort into", file.display()))?;
    let destination_dir = library_root.join(artist).join(album);
    let file_name = file
        .file_name()
        .ok_or_else(|| format!("{} has no file name", file.display()))?;
    let target = destination_dir.join(file_name);
    if target == file {
        return Ok(target);
    }

    log_command(&format!(
        "mkdir -p {} && mv {} {}",
        shell_quote(&destination_dir),
        shell_quote(file),
        shell_quote(&destination_dir)
    ));
    if dry_run {
        return Ok(target);
    }
    fs::create_dir_all(&destination_dir)
        .map_err(|err| format!("failed to create {}: {}", destination_dir.display(), err))?;
    move_file(file, &target)?;
    Ok(target)
}

/// Writes `lyrics` to `<stem>.lrc` next to `file`.
pub fn save_lrc(file: &Path, lyrics: &str, dry_run: bool) -> Result<Option<PathBuf>, String> {
    if lyrics.trim().is_empty() {
        return Ok(None);
    }
    let lrc_path = file.with_extension("lrc");
    log_command(&format!("Write lyrics to: {}", lrc_path.display()));
    if dry_run {
        return Ok(Some(lrc_path));
    }
    fs::write(&lrc_path, lyrics)
        .map_err(|err| format!("Failed to save .lrc {}: {}", lrc_path.display(), err))?;
    Ok(Some(lrc_path))
}

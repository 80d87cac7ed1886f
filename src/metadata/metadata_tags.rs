//! Existing-tag readers backed by `lofty`, with a `symphonia` fallback for
//! files lofty refuses to parse.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode};
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use log::{debug, warn};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;

/// Common metadata values already present on a local file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonTrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub year: String,
    pub genre: String,
    pub track_number: String,
}

impl CommonTrackMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.artist.is_empty()
            && self.album.is_empty()
            && self.album_artist.is_empty()
            && self.year.is_empty()
            && self.genre.is_empty()
            && self.track_number.is_empty()
    }
}

/// What a probe of one file yielded.
#[derive(Debug, Clone, Default)]
pub struct ProbedFile {
    pub tags: Option<CommonTrackMetadata>,
    pub duration_secs: Option<u32>,
}

fn first_non_empty<F>(tagged_file: &TaggedFile, mut extractor: F) -> String
where
    F: FnMut(&Tag) -> Option<String>,
{
    tagged_file
        .primary_tag()
        .into_iter()
        .chain(tagged_file.tags().iter())
        .filter_map(|tag| extractor(tag))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

pub fn derive_year_from_date(date: &str) -> String {
    let mut digits = String::with_capacity(4);
    for ch in date.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                return digits;
            }
        } else {
            digits.clear();
        }
    }
    String::new()
}

fn parse_options(read_properties: bool, read_cover_art: bool, mode: ParsingMode) -> ParseOptions {
    let max_junk_bytes = match mode {
        ParsingMode::Relaxed => 64 * 1024,
        _ => 1024,
    };
    ParseOptions::new()
        .read_properties(read_properties)
        .read_cover_art(read_cover_art)
        .parsing_mode(mode)
        .max_junk_bytes(max_junk_bytes)
}

/// Opens a file for tag access, retrying with content sniffing and relaxed
/// parsing when the extension-based probe fails.
pub fn read_tagged_file(path: &Path, read_properties: bool, read_cover_art: bool) -> Option<TaggedFile> {
    let strict = parse_options(read_properties, read_cover_art, ParsingMode::BestAttempt);
    match Probe::open(path).and_then(|probe| probe.options(strict).read()) {
        Ok(tagged_file) => return Some(tagged_file),
        Err(error) => debug!("Tag read failed for {}: {}", path.display(), error),
    }

    let file = File::open(path)
        .map_err(|error| debug!("Cannot reopen {}: {}", path.display(), error))
        .ok()?;
    let relaxed = parse_options(read_properties, read_cover_art, ParsingMode::Relaxed);
    let guessed_probe = match Probe::new(BufReader::new(file))
        .options(relaxed)
        .guess_file_type()
    {
        Ok(probe) => probe,
        Err(error) => {
            debug!("Cannot guess file type of {}: {}", path.display(), error);
            return None;
        }
    };
    match guessed_probe.read() {
        Ok(tagged_file) => {
            debug!("Tag read recovered with relaxed parsing for {}", path.display());
            Some(tagged_file)
        }
        Err(error) => {
            debug!("Relaxed tag read failed for {}: {}", path.display(), error);
            None
        }
    }
}

fn common_metadata_from_lofty(tagged_file: &TaggedFile) -> CommonTrackMetadata {
    let date = first_non_empty(tagged_file, |tag| {
        tag.get_string(ItemKey::RecordingDate)
            .or_else(|| tag.get_string(ItemKey::ReleaseDate))
            .or_else(|| tag.get_string(ItemKey::Year))
            .map(str::to_string)
    });
    CommonTrackMetadata {
        title: first_non_empty(tagged_file, |tag| tag.title().map(|v| v.into_owned())),
        artist: first_non_empty(tagged_file, |tag| tag.artist().map(|v| v.into_owned())),
        album: first_non_empty(tagged_file, |tag| tag.album().map(|v| v.into_owned())),
        album_artist: first_non_empty(tagged_file, |tag| {
            tag.get_string(ItemKey::AlbumArtist).map(str::to_string)
        }),
        year: derive_year_from_date(&date),
        genre: first_non_empty(tagged_file, |tag| tag.genre().map(|v| v.into_owned())),
        track_number: first_non_empty(tagged_file, |tag| tag.track().map(|v| v.to_string())),
    }
}

fn apply_symphonia_revision(metadata: &mut CommonTrackMetadata, revision: &MetadataRevision) {
    for tag in revision.tags() {
        let value = tag.value.to_string().trim().to_string();
        if value.is_empty() {
            continue;
        }
        let target = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => &mut metadata.title,
            Some(StandardTagKey::Artist) => &mut metadata.artist,
            Some(StandardTagKey::Album) => &mut metadata.album,
            Some(StandardTagKey::AlbumArtist) => &mut metadata.album_artist,
            Some(StandardTagKey::Genre) => &mut metadata.genre,
            Some(StandardTagKey::TrackNumber) => &mut metadata.track_number,
            Some(StandardTagKey::Date) | Some(StandardTagKey::ReleaseDate) => {
                if metadata.year.is_empty() {
                    metadata.year = derive_year_from_date(&value);
                }
                continue;
            }
            _ => continue,
        };
        if target.is_empty() {
            *target = value;
        }
    }
}

fn common_metadata_from_symphonia(path: &Path) -> Option<CommonTrackMetadata> {
    let file = File::open(path).ok()?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }
    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let mut metadata = CommonTrackMetadata::default();
    if let Some(revision) = probed.metadata.get().as_ref().and_then(|meta| meta.current()) {
        apply_symphonia_revision(&mut metadata, revision);
    }
    while !probed.format.metadata().is_latest() {
        probed.format.metadata().pop();
    }
    if let Some(revision) = probed.format.metadata().current() {
        apply_symphonia_revision(&mut metadata, revision);
    }

    (!metadata.is_empty()).then_some(metadata)
}

/// Reads existing tags and the playback duration of a file.
pub fn probe_file(path: &Path) -> ProbedFile {
    if let Some(tagged_file) = read_tagged_file(path, true, false) {
        let tags = common_metadata_from_lofty(&tagged_file);
        let duration = tagged_file.properties().duration().as_secs();
        return ProbedFile {
            tags: (!tags.is_empty()).then_some(tags),
            duration_secs: (duration > 0).then(|| u32::try_from(duration).unwrap_or(u32::MAX)),
        };
    }

    let tags = common_metadata_from_symphonia(path);
    if tags.is_some() {
        debug!("Tag read recovered via symphonia for {}", path.display());
    } else {
        warn!("Could not read tags from {}", path.display());
    }
    ProbedFile {
        tags,
        duration_secs: None,
    }
}

/// Reads the first embedded picture, preferring the front cover.
pub fn read_embedded_cover_art(path: &Path) -> Option<Vec<u8>> {
    let tagged_file = read_tagged_file(path, false, true)?;
    let tags: Vec<&Tag> = tagged_file
        .primary_tag()
        .into_iter()
        .chain(tagged_file.tags().iter())
        .collect();
    tags.iter()
        .flat_map(|tag| tag.pictures())
        .find(|picture| picture.pic_type() == lofty::picture::PictureType::CoverFront)
        .or_else(|| tags.iter().flat_map(|tag| tag.pictures()).next())
        .map(|picture| picture.data().to_vec())
}

//! Tag writing for matched files.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};

/// Values written onto one audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub lyrics: Option<String>,
}

fn open_for_write(path: &Path) -> Result<TaggedFile, String> {
    let mut tagged_file =
        read_from_path(path).map_err(|error| format!("Failed to read tags: {error}"))?;
    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    Ok(tagged_file)
}

fn primary_tag_mut(tagged_file: &mut TaggedFile) -> Result<&mut Tag, String> {
    let tag_type = tagged_file.primary_tag_type();
    tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| "Primary tag is unavailable".to_string())
}

fn set_optional_text(tag: &mut Tag, key: ItemKey, value: Option<&str>) {
    tag.remove_key(key);
    if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
        tag.insert_text(key, value.to_string());
    }
}

fn apply_track_tags(tag: &mut Tag, tags: &TrackTags, embed_lyrics: bool) {
    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album.clone());
    if let Some(track_number) = tags.track_number.filter(|number| *number > 0) {
        tag.set_track(track_number);
    }
    set_optional_text(tag, ItemKey::AlbumArtist, Some(&tags.album_artist));
    set_optional_text(tag, ItemKey::Year, tags.year.as_deref());
    set_optional_text(tag, ItemKey::RecordingDate, tags.year.as_deref());
    match tags.genre.as_deref().map(str::trim) {
        Some(genre) if !genre.is_empty() => tag.set_genre(genre.to_string()),
        _ => tag.remove_genre(),
    }
    if embed_lyrics {
        set_optional_text(tag, ItemKey::Lyrics, tags.lyrics.as_deref());
    }
    tag.remove_empty();
}

/// Writes `tags` into the file's primary tag, creating one when missing.
/// Lyrics are only touched when `embed_lyrics` is set.
pub fn write_track_tags(path: &Path, tags: &TrackTags, embed_lyrics: bool) -> Result<(), String> {
    let mut tagged_file = open_for_write(path)?;
    apply_track_tags(primary_tag_mut(&mut tagged_file)?, tags, embed_lyrics);
    tagged_file
        .save_to_path(path, WriteOptions::default())
        .map_err(|error| format!("Failed to write tags: {error}"))
}

/// Replaces the embedded front cover with the given JPEG bytes.
pub fn embed_cover_art(path: &Path, jpeg_bytes: &[u8]) -> Result<(), String> {
    let mut tagged_file = open_for_write(path)?;
    let tag = primary_tag_mut(&mut tagged_file)?;
    tag.remove_picture_type(PictureType::CoverFront);
    tag.push_picture(
        Picture::unchecked(jpeg_bytes.to_vec())
            .pic_type(PictureType::CoverFront)
            .mime_type(MimeType::Jpeg)
            .build(),
    );
    tagged_file
        .save_to_path(path, WriteOptions::default())
        .map_err(|error| format!("Failed to embed cover art: {error}"))
}

#[cfg(test)]
mod tests {
    use super::{apply_track_tags, TrackTags};
    use lofty::prelude::Accessor;
    use lofty::tag::{ItemKey, Tag, TagType};

    fn sample_tags() -> TrackTags {
        TrackTags {
            title: "Intro".to_string(),
            artist: "AllttA; 20syl; Mr. J. Medeiros".to_string(),
            album: "The Upper Hand".to_string(),
            album_artist: "AllttA".to_string(),
            year: Some("2017".to_string()),
            genre: Some("Hip-Hop".to_string()),
            track_number: Some(1),
            lyrics: Some("line one\nline two".to_string()),
        }
    }

    #[test]
    fn test_apply_track_tags_sets_common_fields() {
        let mut tag = Tag::new(TagType::Id3v2);
        apply_track_tags(&mut tag, &sample_tags(), true);

        assert_eq!(tag.title().as_deref(), Some("Intro"));
        assert_eq!(tag.album().as_deref(), Some("The Upper Hand"));
        assert_eq!(tag.track(), Some(1));
        assert_eq!(tag.genre().as_deref(), Some("Hip-Hop"));
        assert_eq!(tag.get_string(ItemKey::AlbumArtist), Some("AllttA"));
        assert_eq!(tag.get_string(ItemKey::Lyrics), Some("line one\nline two"));
    }

    #[test]
    fn test_apply_track_tags_leaves_lyrics_when_not_embedding() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.insert_text(ItemKey::Lyrics, "old words".to_string());
        apply_track_tags(&mut tag, &sample_tags(), false);

        assert_eq!(tag.get_string(ItemKey::Lyrics), Some("old words"));
    }

    #[test]
    fn test_apply_track_tags_clears_missing_genre() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.set_genre("Rock".to_string());
        let tags = TrackTags {
            genre: None,
            ..sample_tags()
        };
        apply_track_tags(&mut tag, &tags, false);

        assert_eq!(tag.genre(), None);
    }
}

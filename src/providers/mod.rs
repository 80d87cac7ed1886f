//! Online metadata sources: Genius for tracklists and lyrics, MusicBrainz for
//! release year and genre.

pub mod genius;
pub mod http;
pub mod musicbrainz;

use log::{debug, warn};

use crate::reconcile::TracklistEntry;
use genius::GeniusClient;
use http::HttpClient;
use musicbrainz::MusicBrainzClient;

/// One album search hit offered for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumCandidate {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumDetails {
    pub album: String,
    pub artist: String,
    pub cover_url: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub tracks: Vec<TracklistEntry>,
}

/// What is known about a single song before looking it up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongQuery {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Explicit Genius song page.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongData {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub lyrics: Option<String>,
    pub cover_url: Option<String>,
    pub song_id: Option<u64>,
}

/// Source of canonical album and song metadata.
pub trait MetadataSource {
    fn search_albums(&self, query: &str) -> Result<Vec<AlbumCandidate>, String>;
    fn fetch_album(&self, album_id: u64) -> Result<AlbumDetails, String>;
    fn fetch_lyrics(&self, song_id: u64) -> Result<Option<String>, String>;
    /// Best-effort song lookup; unknown fields stay as given in `query`.
    fn fetch_song(&self, query: &SongQuery) -> Result<SongData, String>;
    fn download(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Genius plus MusicBrainz behind one `MetadataSource`.
pub struct OnlineMetadataSource {
    http: HttpClient,
    genius: Option<GeniusClient>,
    musicbrainz: MusicBrainzClient,
}

impl OnlineMetadataSource {
    pub fn new(genius_token: Option<String>, blacklisted_genres: Vec<String>) -> Self {
        let genius = genius_token
            .filter(|token| !token.trim().is_empty())
            .map(GeniusClient::new);
        if genius.is_none() {
            warn!("No Genius token found. Run `swisstag --setup-token` to configure one.");
        }
        Self {
            http: HttpClient::new(),
            genius,
            musicbrainz: MusicBrainzClient::new(blacklisted_genres),
        }
    }

    fn release_info(&self, artist: &str, album: &str) -> musicbrainz::ReleaseInfo {
        match self.musicbrainz.search_release(&self.http, artist, album) {
            Ok(info) => info,
            Err(err) => {
                log::error!("MusicBrainz error: {}", err);
                musicbrainz::ReleaseInfo::default()
            }
        }
    }
}

impl MetadataSource for OnlineMetadataSource {
    fn search_albums(&self, query: &str) -> Result<Vec<AlbumCandidate>, String> {
        match &self.genius {
            Some(genius) => genius.search_albums(&self.http, query),
            None => Ok(Vec::new()),
        }
    }

    fn fetch_album(&self, album_id: u64) -> Result<AlbumDetails, String> {
        let Some(genius) = &self.genius else {
            return Ok(AlbumDetails::default());
        };
        let mut details = genius.fetch_album(&self.http, album_id)?;
        if !details.album.is_empty() && !details.artist.is_empty() {
            let release = self.release_info(&details.artist, &details.album);
            details.year = release.year.or(details.year);
            details.genre = release.genre;
        }
        debug!(target: "vars", "Album details: {:?}", details);
        Ok(details)
    }

    fn fetch_lyrics(&self, song_id: u64) -> Result<Option<String>, String> {
        match &self.genius {
            Some(genius) => genius.fetch_lyrics(&self.http, song_id),
            None => Ok(None),
        }
    }

    fn fetch_song(&self, query: &SongQuery) -> Result<SongData, String> {
        let mut data = SongData {
            title: query.title.clone(),
            artist: query.artist.clone(),
            album: query.album.clone(),
            ..SongData::default()
        };
        if let Some(genius) = &self.genius {
            if let Some(found) = genius.find_song(&self.http, query)? {
                data = found;
            }
        }
        if let (Some(artist), Some(album)) = (&data.artist, &data.album) {
            let release = self.release_info(artist, album);
            data.year = release.year.or(data.year);
            data.genre = release.genre;
        }
        Ok(data)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        self.http.get_bytes(url, &[])
    }
}

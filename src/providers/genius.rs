//! Genius API client: album search, tracklists, song lookup and lyrics scraping.

use std::collections::BTreeSet;

use log::debug;
use serde_json::Value;

use super::http::{request_url, HttpClient};
use super::{AlbumCandidate, AlbumDetails, SongData, SongQuery};
use crate::reconcile::normalize::normalize_title;
use crate::reconcile::similarity::title_similarity;
use crate::reconcile::TracklistEntry;

const API_BASE_URL: &str = "https://api.genius.com";
const PUBLIC_API_BASE_URL: &str = "https://genius.com/api";
const MAX_ALBUM_CANDIDATES: usize = 5;
const SONG_SEARCH_PER_PAGE: &str = "5";
const TRACKS_PER_PAGE: &str = "50";
const MAX_TRACK_PAGES: u64 = 20;
/// Minimum title similarity for a song search hit.
const SONG_MATCH_THRESHOLD: f64 = 0.70;
const LYRICS_CONTAINER_MARKER: &str = "data-lyrics-container=\"true\"";
const EXCLUDED_FROM_SELECTION_MARKER: &str = "data-exclude-from-selection=\"true\"";

pub struct GeniusClient {
    token: String,
}

fn json_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn json_year(value: &Value) -> Option<String> {
    value["release_date_components"]["year"]
        .as_u64()
        .map(|year| year.to_string())
}

/// Album hits from the public search endpoint, at most five.
pub fn parse_album_candidates(body: &Value) -> Vec<AlbumCandidate> {
    let Some(sections) = body["response"]["sections"].as_array() else {
        return Vec::new();
    };
    sections
        .iter()
        .filter(|section| section["type"].as_str() == Some("album"))
        .filter_map(|section| section["hits"].as_array())
        .flatten()
        .filter_map(|hit| {
            let result = &hit["result"];
            Some(AlbumCandidate {
                id: result["id"].as_u64()?,
                title: json_string(&result["name"])
                    .or_else(|| json_string(&result["title"]))
                    .unwrap_or_else(|| "Unknown".to_string()),
                artist: json_string(&result["artist"]["name"])
                    .unwrap_or_else(|| "Unknown".to_string()),
                cover_url: json_string(&result["cover_art_url"]),
                url: json_string(&result["url"]),
            })
        })
        .take(MAX_ALBUM_CANDIDATES)
        .collect()
}

/// Album header fields; `tracks` is left empty.
pub fn parse_album_details(album: &Value) -> AlbumDetails {
    AlbumDetails {
        album: json_string(&album["name"]).unwrap_or_default(),
        artist: json_string(&album["artist"]["name"]).unwrap_or_default(),
        cover_url: json_string(&album["cover_art_url"]),
        year: json_year(album),
        genre: None,
        tracks: Vec::new(),
    }
}

/// One page of `/albums/{id}/tracks`: the entries (number may be missing)
/// and the next page, if any.
pub fn parse_album_tracks(response: &Value) -> (Vec<(Option<u32>, TracklistEntry)>, Option<u64>) {
    let tracks = response["tracks"]
        .as_array()
        .map(|tracks| {
            tracks
                .iter()
                .filter_map(|track| {
                    let song = &track["song"];
                    let title = json_string(&song["title"])?;
                    let number = track["number"]
                        .as_u64()
                        .and_then(|number| u32::try_from(number).ok())
                        .filter(|number| *number > 0);
                    let mut entry = TracklistEntry::new(number.unwrap_or(0), title);
                    entry.song_id = song["id"].as_u64();
                    entry.artist = json_string(&song["artist_names"]);
                    Some((number, entry))
                })
                .collect()
        })
        .unwrap_or_default();
    (tracks, response["next_page"].as_u64())
}

/// Gives every entry a unique non-zero position. Entries without a number, or
/// repeating one already taken, are placed after the highest known position
/// in listing order.
pub fn assign_positions(raw: Vec<(Option<u32>, TracklistEntry)>) -> Vec<TracklistEntry> {
    let mut taken = BTreeSet::new();
    let mut next_free = raw
        .iter()
        .filter_map(|(number, _)| *number)
        .max()
        .unwrap_or(0);
    let mut entries = Vec::with_capacity(raw.len());
    for (number, mut entry) in raw {
        let position = match number {
            Some(number) if taken.insert(number) => number,
            _ => {
                next_free += 1;
                taken.insert(next_free);
                next_free
            }
        };
        entry.position = position;
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.position);
    entries
}

/// Best song hit by title similarity, if it clears the match threshold.
pub fn best_song_hit(response: &Value, title: &str) -> Option<(u64, f64)> {
    let wanted = normalize_title(title);
    let mut best: Option<(u64, f64)> = None;
    for hit in response["hits"].as_array()? {
        if hit["type"].as_str().is_some_and(|kind| kind != "song") {
            continue;
        }
        let result = &hit["result"];
        let (Some(id), Some(hit_title)) = (result["id"].as_u64(), result["title"].as_str()) else {
            continue;
        };
        let score = title_similarity(&normalize_title(hit_title), &wanted);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((id, score));
        }
    }
    best.filter(|(_, score)| *score >= SONG_MATCH_THRESHOLD)
}

pub fn parse_song(song: &Value) -> SongData {
    SongData {
        title: json_string(&song["title"]),
        artist: json_string(&song["artist_names"]),
        album: json_string(&song["album"]["name"]),
        year: json_year(song),
        genre: None,
        lyrics: None,
        cover_url: json_string(&song["song_art_image_url"]),
        song_id: song["id"].as_u64(),
    }
}

/// Search terms guessed from a song page URL such as
/// `https://genius.com/Alltta-the-woods-lyrics`.
/// A URL with no path after the host has no terms.
pub fn search_terms_from_url(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_host, path) = without_scheme.split_once('/')?;
    let path = path.split(['?', '#']).next()?.trim_matches('/');
    let slug = path.rsplit('/').next().filter(|slug| !slug.is_empty())?;
    let slug = slug.strip_suffix("-lyrics").unwrap_or(slug);
    let terms = slug.replace('-', " ");
    let terms = terms.trim();
    (!terms.is_empty()).then(|| terms.to_string())
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

pub fn decode_html_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let entity = candidate
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&candidate[1..end]).map(|ch| (ch, end)));
        match entity {
            Some((ch, end)) => {
                decoded.push(ch);
                rest = &candidate[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split(|ch: char| ch.is_whitespace() || ch == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Finds the close of the element whose content starts at `start`. Returns
/// the content end and the offset just past the closing tag.
fn matching_close(html: &str, start: usize, name: &str) -> (usize, usize) {
    let open = format!("<{name}");
    let close = format!("</{name}");
    let mut depth = 1usize;
    let mut pos = start;
    loop {
        let rest = &html[pos..];
        match (rest.find(&open), rest.find(&close)) {
            (_, None) => return (html.len(), html.len()),
            (Some(open_at), Some(close_at)) if open_at < close_at => {
                depth += 1;
                pos += open_at + open.len();
            }
            (_, Some(close_at)) => {
                depth -= 1;
                let close_start = pos + close_at;
                if depth == 0 {
                    let after = html[close_start..]
                        .find('>')
                        .map(|end| close_start + end + 1)
                        .unwrap_or(html.len());
                    return (close_start, after);
                }
                pos = close_start + close.len();
            }
        }
    }
}

fn html_fragment_to_text(fragment: &str) -> String {
    let mut text = String::new();
    let mut pos = 0;
    while pos < fragment.len() {
        let rest = &fragment[pos..];
        let Some(tag_offset) = rest.find('<') else {
            text.push_str(rest);
            break;
        };
        text.push_str(&rest[..tag_offset]);
        let tag_start = pos + tag_offset;
        let Some(tag_len) = fragment[tag_start..].find('>') else {
            break;
        };
        let tag = &fragment[tag_start + 1..tag_start + tag_len];
        pos = tag_start + tag_len + 1;

        let name = tag_name(tag);
        if name == "br" {
            text.push('\n');
        } else if tag.contains(EXCLUDED_FROM_SELECTION_MARKER) && !tag.ends_with('/') {
            pos = matching_close(fragment, pos, &name).1;
        }
    }
    decode_html_entities(&text)
}

/// Lyrics text from a Genius song page, joined across all lyrics containers.
pub fn extract_lyrics(html: &str) -> Option<String> {
    let mut sections = Vec::new();
    let mut cursor = 0;
    while let Some(found) = html[cursor..].find(LYRICS_CONTAINER_MARKER) {
        let marker_at = cursor + found;
        let Some(open_end) = html[marker_at..].find('>') else {
            break;
        };
        let content_start = marker_at + open_end + 1;
        let (content_end, after) = matching_close(html, content_start, "div");
        sections.push(html_fragment_to_text(&html[content_start..content_end]));
        cursor = after;
    }

    let lyrics = sections
        .join("\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    (!lyrics.is_empty()).then_some(lyrics)
}

impl GeniusClient {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    fn api_get(&self, http: &HttpClient, path: &str, params: &[(&str, &str)]) -> Result<Value, String> {
        let url = request_url(&format!("{API_BASE_URL}{path}"), params);
        let authorization = format!("Bearer {}", self.token);
        let body = http.get_json(
            &url,
            &[
                ("Authorization", authorization.as_str()),
                ("Accept", "application/json"),
            ],
        )?;
        if let Some(status) = body["meta"]["status"].as_u64().filter(|status| *status != 200) {
            let message = body["meta"]["message"].as_str().unwrap_or("unknown error");
            return Err(format!("Genius returned {status}: {message}"));
        }
        Ok(body["response"].clone())
    }

    /// Checks the token with a one-hit search.
    pub fn validate(&self, http: &HttpClient) -> Result<bool, String> {
        match self.api_get(http, "/search", &[("q", "Test"), ("per_page", "1")]) {
            Ok(response) => Ok(response["hits"].is_array()),
            Err(err) if err.contains("401") => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn search_songs(&self, http: &HttpClient, terms: &str) -> Result<Value, String> {
        debug!(target: "network", "Searching Genius for songs: {}", terms);
        self.api_get(
            http,
            "/search",
            &[("q", terms), ("per_page", SONG_SEARCH_PER_PAGE)],
        )
    }

    fn lyrics_from_page(&self, http: &HttpClient, url: &str) -> Result<Option<String>, String> {
        debug!(target: "network", "Fetching lyrics page {}", url);
        let html = http.get_text(url, &[("Accept", "text/html")])?;
        Ok(extract_lyrics(&html))
    }

    pub fn search_albums(&self, http: &HttpClient, query: &str) -> Result<Vec<AlbumCandidate>, String> {
        debug!(target: "network", "Searching Genius for albums: {}", query);
        let url = request_url(
            &format!("{PUBLIC_API_BASE_URL}/search/album"),
            &[("q", query), ("per_page", "5")],
        );
        let body = http.get_json(&url, &[("Accept", "application/json")])?;
        Ok(parse_album_candidates(&body))
    }

    pub fn fetch_album(&self, http: &HttpClient, album_id: u64) -> Result<AlbumDetails, String> {
        debug!(target: "network", "Fetching album details id={}", album_id);
        let response = self.api_get(http, &format!("/albums/{album_id}"), &[])?;
        let mut details = parse_album_details(&response["album"]);

        let mut raw_tracks = Vec::new();
        let mut page = 1u64;
        loop {
            let page_text = page.to_string();
            let response = self.api_get(
                http,
                &format!("/albums/{album_id}/tracks"),
                &[("per_page", TRACKS_PER_PAGE), ("page", page_text.as_str())],
            )?;
            let (tracks, next_page) = parse_album_tracks(&response);
            raw_tracks.extend(tracks);
            match next_page {
                Some(next) if next > page && next <= MAX_TRACK_PAGES => page = next,
                _ => break,
            }
        }
        details.tracks = assign_positions(raw_tracks);
        Ok(details)
    }

    pub fn fetch_lyrics(&self, http: &HttpClient, song_id: u64) -> Result<Option<String>, String> {
        debug!(target: "network", "Fetching lyrics for song id={}", song_id);
        let response = self.api_get(http, &format!("/songs/{song_id}"), &[])?;
        match json_string(&response["song"]["url"]) {
            Some(url) => self.lyrics_from_page(http, &url),
            None => Ok(None),
        }
    }

    fn fetch_song_by_id(&self, http: &HttpClient, song_id: u64) -> Result<SongData, String> {
        let response = self.api_get(http, &format!("/songs/{song_id}"), &[])?;
        let song = &response["song"];
        let mut data = parse_song(song);
        if let Some(url) = json_string(&song["url"]) {
            data.lyrics = self.lyrics_from_page(http, &url)?;
        }
        Ok(data)
    }

    fn find_song_by_url(&self, http: &HttpClient, query: &SongQuery, url: &str) -> Result<SongData, String> {
        if let Some(terms) = search_terms_from_url(url) {
            let response = self.search_songs(http, &terms)?;
            let song_id = response["hits"].as_array().and_then(|hits| {
                hits.iter()
                    .map(|hit| &hit["result"])
                    .find(|result| result["url"].as_str() == Some(url))
                    .and_then(|result| result["id"].as_u64())
            });
            if let Some(song_id) = song_id {
                return self.fetch_song_by_id(http, song_id);
            }
        }
        debug!(target: "vars", "No search hit for {}; reading lyrics only", url);
        Ok(SongData {
            title: query.title.clone(),
            artist: query.artist.clone(),
            album: query.album.clone(),
            lyrics: self.lyrics_from_page(http, url)?,
            ..SongData::default()
        })
    }

    /// Looks a song up by explicit URL, or by artist and title search.
    pub fn find_song(&self, http: &HttpClient, query: &SongQuery) -> Result<Option<SongData>, String> {
        if let Some(url) = &query.url {
            return self.find_song_by_url(http, query, url).map(Some);
        }
        let (Some(title), Some(artist)) = (&query.title, &query.artist) else {
            return Ok(None);
        };
        let response = self.search_songs(http, &format!("{artist} {title}"))?;
        match best_song_hit(&response, title) {
            Some((song_id, score)) => {
                debug!(target: "vars", "Best Genius hit id={} score={:.2}", song_id, score);
                self.fetch_song_by_id(http, song_id).map(Some)
            }
            None => Ok(None),
        }
    }
}

//! MusicBrainz release lookup for release year and genre.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use super::http::{request_url, HttpClient};

const RELEASE_SEARCH_URL: &str = "https://musicbrainz.org/ws/2/release/";
/// MusicBrainz allows one request per second per client.
const REQUEST_PERIOD: Duration = Duration::from_secs(1);

/// Year and genre of the best matching release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub year: Option<String>,
    pub genre: Option<String>,
}

pub struct MusicBrainzClient {
    limiter: RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
    blacklisted_genres: Vec<String>,
}

fn escape_lucene_phrase(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn release_query(artist: &str, album: &str) -> String {
    format!(
        "artist:\"{}\" AND release:\"{}\"",
        escape_lucene_phrase(artist),
        escape_lucene_phrase(album)
    )
}

/// Reads the first release of a search response. The genre is the
/// highest-count tag (or genre) that is not blacklisted.
pub fn parse_release_info(body: &Value, blacklisted_genres: &[String]) -> ReleaseInfo {
    let Some(release) = body["releases"].as_array().and_then(|releases| releases.first()) else {
        return ReleaseInfo::default();
    };

    let year = release["date"]
        .as_str()
        .and_then(|date| date.get(..4))
        .filter(|year| year.chars().all(|ch| ch.is_ascii_digit()))
        .map(str::to_string);

    let mut tags: Vec<(u64, &str)> = ["genres", "tags"]
        .iter()
        .filter_map(|key| release[*key].as_array())
        .flatten()
        .filter_map(|tag| Some((tag["count"].as_u64().unwrap_or(0), tag["name"].as_str()?)))
        .filter(|(_, name)| {
            !blacklisted_genres
                .iter()
                .any(|blocked| blocked.eq_ignore_ascii_case(name.trim()))
        })
        .collect();
    tags.sort_by(|left, right| right.0.cmp(&left.0).then_with(|| left.1.cmp(right.1)));
    let genre = tags.first().map(|(_, name)| title_case_genre(name));

    ReleaseInfo { year, genre }
}

fn title_case_genre(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl MusicBrainzClient {
    pub fn new(blacklisted_genres: Vec<String>) -> Self {
        Self {
            limiter: RateLimiter::direct(
                Quota::with_period(REQUEST_PERIOD)
                    .expect("valid limiter period")
                    .allow_burst(NonZeroU32::new(1).expect("non-zero limiter burst")),
            ),
            blacklisted_genres,
        }
    }

    fn wait_for_slot(&self) {
        while self.limiter.check().is_err() {
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn search_release(
        &self,
        http: &HttpClient,
        artist: &str,
        album: &str,
    ) -> Result<ReleaseInfo, String> {
        let query = release_query(artist, album);
        let url = request_url(
            RELEASE_SEARCH_URL,
            &[("query", query.as_str()), ("fmt", "json"), ("limit", "1")],
        );
        self.wait_for_slot();
        debug!(target: "network", "Searching MusicBrainz: {}", query);
        let body = http.get_json(&url, &[("Accept", "application/json")])?;
        let info = parse_release_info(&body, &self.blacklisted_genres);
        debug!(target: "vars", "MusicBrainz release info: {:?}", info);
        Ok(info)
    }
}

//! Artist credit processing: featured-artist extraction, group expansion and joining.

use std::collections::HashMap;

use log::debug;
use regex::Regex;

use crate::config::{Config, FeatHandling};

/// Title and artist credits of one track before they are written as tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackCredits {
    pub title: String,
    pub artists: Vec<String>,
    pub album_artists: Vec<String>,
}

pub struct CreditRules {
    feature_pattern: Regex,
    mode: FeatHandling,
    known_artists: Vec<String>,
    groups: HashMap<String, Vec<String>>,
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !name.is_empty() && !list.contains(&name) {
        list.push(name);
    }
}

/// Order-preserving de-duplication.
pub fn dedup_preserving_order(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut unique = Vec::new();
    for name in names {
        push_unique(&mut unique, name);
    }
    unique
}

pub fn join_artists(artists: &[String], separator: &str) -> String {
    artists.join(separator)
}

fn known_prefix_len(text: &str, known_artists: &[String]) -> Option<usize> {
    known_artists
        .iter()
        .filter(|name| !name.is_empty())
        .filter(|name| {
            text.get(..name.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(name))
        })
        .filter(|name| {
            let tail = text[name.len()..].trim_start();
            tail.is_empty() || tail.starts_with([',', '&'])
        })
        .map(|name| name.len())
        .max()
}

/// Splits a credit list on `,` and `&`, keeping names from `known_artists` whole.
pub fn split_credit_list(list: &str, known_artists: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = list.trim_start();
    while !rest.is_empty() {
        let split_at = known_prefix_len(rest, known_artists)
            .or_else(|| rest.find([',', '&']))
            .unwrap_or(rest.len());
        let (name, tail) = rest.split_at(split_at);
        push_unique(&mut names, name.trim().to_string());
        let tail = tail.trim_start();
        rest = tail.strip_prefix([',', '&']).unwrap_or(tail).trim_start();
    }
    names
}

/// Removes the first featured-artist credit from `text` and returns the
/// featured names with the cleaned text.
pub fn extract_features(
    text: &str,
    pattern: &Regex,
    known_artists: &[String],
) -> (Vec<String>, String) {
    let Some(captures) = pattern.captures(text) else {
        return (Vec::new(), text.to_string());
    };
    let featured = captures
        .get(1)
        .map(|list| split_credit_list(list.as_str(), known_artists))
        .unwrap_or_default();
    let cleaned = pattern.replace(text, "");
    (
        featured,
        cleaned.split_whitespace().collect::<Vec<_>>().join(" "),
    )
}

impl CreditRules {
    pub fn new(
        feature_pattern: Regex,
        mode: FeatHandling,
        known_artists: Vec<String>,
        groups: impl IntoIterator<Item = (String, Vec<String>)>,
    ) -> Self {
        Self {
            feature_pattern,
            mode,
            known_artists,
            groups: groups
                .into_iter()
                .map(|(group, members)| (group.to_lowercase(), members))
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, String> {
        let pattern = Regex::new(&config.regex.featured_artist).map_err(|err| {
            format!(
                "invalid featured artist pattern '{}': {}",
                config.regex.featured_artist, err
            )
        })?;
        Ok(Self::new(
            pattern,
            config.defaults.feat_handling,
            config.known_artists.clone(),
            config.artist_groups.clone(),
        ))
    }

    /// Moves featured artists out of the title and artist strings according
    /// to the feature handling mode.
    pub fn handle_features(&self, credits: &mut TrackCredits) {
        if self.mode == FeatHandling::Keep {
            return;
        }

        let (featured, clean_title) =
            extract_features(&credits.title, &self.feature_pattern, &self.known_artists);
        if !featured.is_empty() {
            debug!(target: "vars", "Features in title '{}': {:?}", credits.title, featured);
            credits.title = match self.mode {
                FeatHandling::Split => format!("! {clean_title}"),
                _ => clean_title,
            };
            for name in featured {
                push_unique(&mut credits.artists, name);
            }
        }

        let mut artists = Vec::with_capacity(credits.artists.len());
        for artist in credits.artists.drain(..) {
            let (featured, clean_artist) =
                extract_features(&artist, &self.feature_pattern, &self.known_artists);
            push_unique(&mut artists, clean_artist);
            for name in featured {
                push_unique(&mut artists, name);
            }
        }
        credits.artists = artists;
    }

    /// Follows every configured group with its members.
    pub fn expand_groups(&self, artists: &[String]) -> Vec<String> {
        let mut expanded = Vec::with_capacity(artists.len());
        for artist in artists {
            push_unique(&mut expanded, artist.clone());
            if let Some(members) = self.groups.get(&artist.to_lowercase()) {
                debug!(target: "vars", "Expanding group '{}' -> {:?}", artist, members);
                for member in members {
                    push_unique(&mut expanded, member.clone());
                }
            }
        }
        expanded
    }

    /// Feature handling followed by group expansion of both artist lists.
    pub fn process(&self, mut credits: TrackCredits) -> TrackCredits {
        self.handle_features(&mut credits);
        credits.artists = self.expand_groups(&credits.artists);
        credits.album_artists = self.expand_groups(&credits.album_artists);
        credits
    }
}

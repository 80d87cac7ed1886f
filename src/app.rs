//! Album-mode and single-file-mode orchestration.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::cover_art::{self, CoverSource};
use crate::credits::{dedup_preserving_order, join_artists, CreditRules, TrackCredits};
use crate::media_file_discovery::scan_album_directory;
use crate::metadata::metadata_tags::{probe_file, read_embedded_cover_art, CommonTrackMetadata};
use crate::metadata::tag_writer::{embed_cover_art, write_track_tags, TrackTags};
use crate::organize::{self, clean_single_stem, infer_dirs};
use crate::progress::TreeUi;
use crate::prompt::ManualResolver;
use crate::providers::{MetadataSource, SongQuery};
use crate::reconcile::{reconcile, MatchOptions, MatchStrategy, ReconcileError};

const UNKNOWN_ARTIST: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("album mode requires a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("{} is a directory; use -a for album mode", .0.display())]
    IsADirectory(PathBuf),
    #[error("{0}")]
    Scan(String),
    #[error("no tracks found for album '{0}'")]
    EmptyTracklist(String),
    #[error("metadata lookup failed: {0}")]
    Provider(String),
    #[error("interactive prompt failed: {0}")]
    Prompt(String),
    #[error("invalid credit rules: {0}")]
    Credits(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// `--filesystem` switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilesystemOptions {
    pub rename: bool,
    pub match_filename: bool,
    pub infer_dirs: bool,
    pub autosort: bool,
}

impl FilesystemOptions {
    /// Parses the comma list given to `--filesystem`. Config defaults switch
    /// `rename` and `match_filename` on even when not listed.
    pub fn parse(value: Option<&str>, config: &Config) -> Result<Self, String> {
        let mut options = Self {
            rename: config.defaults.rename,
            match_filename: config.defaults.match_filename,
            ..Self::default()
        };
        for name in value
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            match name {
                "rename" => options.rename = true,
                "match-filename" => options.match_filename = true,
                "infer-dirs" => options.infer_dirs = true,
                "autosort" => options.autosort = true,
                other => {
                    return Err(format!(
                        "unknown filesystem option '{other}'; expected rename, match-filename, infer-dirs or autosort"
                    ))
                }
            }
        }
        Ok(options)
    }
}

/// Per-run settings assembled from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub target: PathBuf,
    pub album_mode: bool,
    pub search: BTreeMap<String, String>,
    pub manual_tags: BTreeMap<String, String>,
    pub filesystem: FilesystemOptions,
    pub cover: Option<CoverSource>,
    pub dry_run: bool,
}

/// Parses `key=value` items; items without `=` are ignored with a warning.
pub fn parse_key_values(items: &[String]) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for item in items {
        match item.split_once('=') {
            Some((key, value)) => {
                values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
            None => warn!("Ignoring '{}': expected key=value", item),
        }
    }
    values
}

/// One file that went through the tagging pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTrack {
    pub source_path: PathBuf,
    pub final_path: PathBuf,
    pub tags: TrackTags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: Vec<ProcessedTrack>,
    pub failed: Vec<(PathBuf, String)>,
    pub unmatched: Vec<PathBuf>,
    /// Set when the run stopped before touching any file.
    pub aborted: bool,
}

impl RunSummary {
    fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }
}

/// Everything the pipeline knows about a track before credits processing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TrackPlan {
    title: String,
    track_number: Option<u32>,
    artists: Vec<String>,
    album_artists: Vec<String>,
    album: String,
    year: Option<String>,
    genre: Option<String>,
    lyrics: Option<String>,
}

/// Inferred artist first, then the provider credit when it differs.
fn merge_artists(inferred: Option<&str>, provider: Option<&str>) -> Vec<String> {
    let inferred = inferred.map(str::trim).filter(|name| !name.is_empty());
    let provider = provider.map(str::trim).filter(|name| !name.is_empty());
    let mut artists = Vec::new();
    if let Some(inferred) = inferred {
        artists.push(inferred.to_string());
    }
    if let Some(provider) = provider {
        if !inferred.is_some_and(|inferred| inferred.eq_ignore_ascii_case(provider)) {
            artists.push(provider.to_string());
        }
    }
    if artists.is_empty() {
        artists.push(UNKNOWN_ARTIST.to_string());
    }
    artists
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct Session<'a> {
    config: &'a Config,
    options: &'a RunOptions,
    source: &'a dyn MetadataSource,
    credit_rules: CreditRules,
}

impl<'a> Session<'a> {
    pub fn new(
        config: &'a Config,
        options: &'a RunOptions,
        source: &'a dyn MetadataSource,
    ) -> Result<Self, AppError> {
        let credit_rules = CreditRules::from_config(config).map_err(AppError::Credits)?;
        Ok(Self {
            config,
            options,
            source,
            credit_rules,
        })
    }

    pub fn run(
        &self,
        resolver: &mut dyn ManualResolver,
        output: &mut dyn Write,
    ) -> Result<RunSummary, AppError> {
        let target = &self.options.target;
        if self.options.album_mode {
            if !target.is_dir() {
                return Err(AppError::NotADirectory(target.clone()));
            }
            self.run_album(target, resolver, output)
        } else {
            if target.is_dir() {
                return Err(AppError::IsADirectory(target.clone()));
            }
            self.run_single(target, output)
        }
    }

    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            threshold: self.config.matching.threshold,
            strategy: if self.options.filesystem.match_filename {
                MatchStrategy::Fuzzy
            } else {
                MatchStrategy::Positional
            },
        }
    }

    /// Search values, with directory names layered on top under `infer-dirs`.
    fn base_query(&self, path: &Path) -> BTreeMap<String, String> {
        let mut query = self.options.search.clone();
        if self.options.filesystem.infer_dirs {
            let inferred = infer_dirs(path);
            debug!(target: "vars", "Inferred from directories: {:?}", inferred);
            if let Some(artist) = inferred.artist {
                query.insert("artist".to_string(), artist);
            }
            if let Some(album) = inferred.album {
                query.insert("album".to_string(), album);
            }
        }
        query
    }

    pub fn run_album(
        &self,
        album_dir: &Path,
        resolver: &mut dyn ManualResolver,
        output: &mut dyn Write,
    ) -> Result<RunSummary, AppError> {
        let files = scan_album_directory(album_dir).map_err(AppError::Scan)?;
        if files.is_empty() {
            warn!("No audio files found in {}", album_dir.display());
            return Ok(RunSummary::aborted());
        }

        let query = self.base_query(album_dir);
        let album = query.get("album").or_else(|| query.get("name"));
        let (Some(artist), Some(album)) = (query.get("artist"), album) else {
            if self.options.filesystem.infer_dirs {
                warn!("Could not infer artist/album from {}", album_dir.display());
            } else {
                warn!("Cannot identify album. Use -f infer-dirs or -s artist=.. album=..");
            }
            return Ok(RunSummary::aborted());
        };

        let search_query = format!("{artist} {album}");
        info!("Searching for album: '{}'", search_query);
        let candidates = self
            .source
            .search_albums(&search_query)
            .map_err(AppError::Provider)?;
        if candidates.is_empty() {
            warn!("No matching albums found for '{}'", search_query);
            return Ok(RunSummary::aborted());
        }
        let Some(choice) = resolver
            .choose_album(&candidates)
            .map_err(AppError::Prompt)?
            .filter(|index| *index < candidates.len())
        else {
            warn!("Aborting.");
            return Ok(RunSummary::aborted());
        };
        let candidate = &candidates[choice];

        let details = self
            .source
            .fetch_album(candidate.id)
            .map_err(AppError::Provider)?;
        if details.tracks.is_empty() {
            return Err(AppError::EmptyTracklist(candidate.title.clone()));
        }

        let mut reconciliation = reconcile(&details.tracks, &files, &self.match_options())?;
        for assignment in &reconciliation.assignments {
            debug!(
                target: "vars",
                "Matched '{}' -> '{}' ({:.2}, {:?})",
                assignment.file.file_name(),
                assignment.entry.title,
                assignment.confidence,
                assignment.basis
            );
        }
        if reconciliation.needs_manual_resolution() {
            let decisions = resolver
                .resolve(
                    &reconciliation.unresolved_files,
                    &reconciliation.unresolved_entries,
                )
                .map_err(AppError::Prompt)?;
            for (decision, err) in reconciliation.apply_manual(&decisions) {
                warn!("Ignoring manual decision {:?}: {}", decision, err);
            }
        }

        let cover_source_url = details.cover_url.as_deref().or(candidate.cover_url.as_deref());
        let first_file = files.first().map(|file| file.path.as_path());
        let cover = self.acquire_cover(cover_source_url, first_file);
        if let Some(bytes) = &cover {
            self.save_cover(album_dir, &details.album, bytes);
        }

        let inferred_artist = self
            .options
            .filesystem
            .infer_dirs
            .then(|| artist.as_str());
        let mut summary = RunSummary {
            unmatched: reconciliation
                .unresolved_files
                .iter()
                .chain(&reconciliation.skipped_files)
                .map(|file| file.path.clone())
                .collect(),
            ..RunSummary::default()
        };

        let mut ui = TreeUi::new(&mut *output);
        ui.start(
            &format!("Retagging album: {} by {}", candidate.title, candidate.artist),
            reconciliation.assignments.len(),
        );
        for assignment in &reconciliation.assignments {
            ui.next(&assignment.file.file_name());
            let entry = &assignment.entry;

            ui.step("Fetching lyrics...");
            let lyrics = entry.song_id.and_then(|song_id| self.lyrics_for(song_id));

            let plan = TrackPlan {
                title: entry.title.clone(),
                track_number: Some(entry.position),
                artists: merge_artists(inferred_artist, entry.artist.as_deref()),
                album_artists: merge_artists(inferred_artist, non_empty(&details.artist).as_deref()),
                album: details.album.clone(),
                year: details.year.clone(),
                genre: details.genre.clone(),
                lyrics,
            };
            ui.step("Applying tags...");
            self.apply_pipeline(&assignment.file.path, plan, cover.as_deref(), &mut ui, &mut summary);
        }
        ui.done();
        Ok(summary)
    }

    pub fn run_single(&self, file: &Path, output: &mut dyn Write) -> Result<RunSummary, AppError> {
        info!("Processing: {}", file.display());
        let mut query = self.base_query(file);
        let existing = probe_file(file).tags.unwrap_or_default();
        fill_from_existing_tags(&mut query, &existing);

        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let title = query
            .get("title")
            .or_else(|| query.get("name"))
            .cloned()
            .unwrap_or_else(|| clean_single_stem(&stem));

        let song_query = SongQuery {
            title: non_empty(&title),
            artist: query.get("artist").cloned(),
            album: query.get("album").cloned(),
            url: query.get("url").cloned(),
        };
        debug!(target: "vars", "Song query: {:?}", song_query);
        let song = self
            .source
            .fetch_song(&song_query)
            .map_err(AppError::Provider)?;

        let inferred_artist = self
            .options
            .filesystem
            .infer_dirs
            .then(|| query.get("artist").map(String::as_str))
            .flatten();
        let provider_artist = song.artist.clone().or_else(|| song_query.artist.clone());
        let album_artist = non_empty(&existing.album_artist);
        let plan = TrackPlan {
            title: song.title.clone().unwrap_or(title),
            track_number: existing
                .track_number
                .parse()
                .ok()
                .or_else(|| crate::reconcile::normalize::leading_track_number(&stem)),
            artists: merge_artists(inferred_artist, provider_artist.as_deref()),
            album_artists: album_artist.into_iter().collect(),
            album: song
                .album
                .clone()
                .or_else(|| song_query.album.clone())
                .unwrap_or_default(),
            year: song.year.clone(),
            genre: song.genre.clone(),
            lyrics: song.lyrics.clone(),
        };

        let cover = self.acquire_cover(song.cover_url.as_deref(), Some(file));
        if let (Some(bytes), Some(parent)) = (&cover, file.parent()) {
            let album_name = if plan.album.is_empty() {
                "Unknown Album"
            } else {
                plan.album.as_str()
            };
            self.save_cover(parent, album_name, bytes);
        }

        let mut summary = RunSummary::default();
        let mut ui = TreeUi::new(&mut *output);
        ui.start(&format!("Tagging: {}", plan.title), 1);
        ui.next(&file.file_name().unwrap_or_default().to_string_lossy());
        self.apply_pipeline(file, plan, cover.as_deref(), &mut ui, &mut summary);
        ui.done();
        Ok(summary)
    }

    fn lyrics_for(&self, song_id: u64) -> Option<String> {
        if !self.config.defaults.lyrics.fetch {
            return None;
        }
        match self.source.fetch_lyrics(song_id) {
            Ok(lyrics) => lyrics,
            Err(err) => {
                error!("Failed to fetch lyrics for song {}: {}", song_id, err);
                None
            }
        }
    }

    fn acquire_cover(&self, cover_url: Option<&str>, first_file: Option<&Path>) -> Option<Vec<u8>> {
        let source = self.options.cover.as_ref()?;
        let cover_config = &self.config.defaults.cover;
        let result = match source {
            CoverSource::Auto => match cover_url {
                Some(url) => self.source.download(url),
                None => Err("no cover art URL available".to_string()),
            },
            CoverSource::File(path) => cover_art::load_cover_file(path),
            CoverSource::Extract => first_file
                .and_then(read_embedded_cover_art)
                .ok_or_else(|| "no embedded cover art to extract".to_string())
                .and_then(|bytes| {
                    cover_art::prepare_extracted_cover(
                        &bytes,
                        cover_config.extract.crop,
                        cover_config.extract.scale,
                        cover_art::parse_cover_size(&cover_config.size),
                    )
                }),
        };
        match result {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!("Cover art unavailable: {}", err);
                None
            }
        }
    }

    fn save_cover(&self, album_dir: &Path, album_name: &str, bytes: &[u8]) {
        let cover_config = &self.config.defaults.cover;
        if let Err(err) = cover_art::save_cover_art(
            album_dir,
            album_name,
            bytes,
            cover_art::parse_cover_size(&cover_config.size),
            cover_config.keep_resized,
            self.options.dry_run,
        ) {
            error!("Failed to save cover art to file: {}", err);
        }
    }

    /// Splits a manual artist value on the configured artist separator.
    fn split_artist_list(&self, value: &str) -> Vec<String> {
        let separator = self.config.separators.artist.trim();
        let names = if separator.is_empty() {
            vec![value.trim().to_string()]
        } else {
            value
                .split(separator)
                .map(|name| name.trim().to_string())
                .collect()
        };
        dedup_preserving_order(names)
    }

    /// `--manual-tags` values replace fetched ones before credits processing.
    fn apply_manual_tags(&self, plan: &mut TrackPlan) {
        for (key, value) in &self.options.manual_tags {
            match key.as_str() {
                "title" | "name" => plan.title = value.clone(),
                "artist" => plan.artists = self.split_artist_list(value),
                "album_artist" | "albumartist" => plan.album_artists = self.split_artist_list(value),
                "album" => plan.album = value.clone(),
                "year" | "date" => plan.year = non_empty(value),
                "genre" => {
                    let genres: Vec<String> = value
                        .split(',')
                        .filter_map(non_empty)
                        .collect();
                    plan.genre = (!genres.is_empty())
                        .then(|| genres.join(self.config.separators.genre.as_str()));
                }
                "track" | "track_number" | "tracknumber" => match value.parse() {
                    Ok(number) => plan.track_number = Some(number),
                    Err(_) => warn!("Ignoring non-numeric track number '{}'", value),
                },
                "lyrics" => plan.lyrics = non_empty(value),
                other => warn!("Ignoring unknown manual tag '{}'", other),
            }
        }
    }

    fn build_tags(&self, mut plan: TrackPlan) -> TrackTags {
        self.apply_manual_tags(&mut plan);
        let credits = self.credit_rules.process(TrackCredits {
            title: plan.title,
            artists: plan.artists,
            album_artists: plan.album_artists,
        });
        let separator = &self.config.separators.artist;
        let artist = join_artists(&credits.artists, separator);
        debug!(target: "vars", "Final artist tag: {}", artist);
        TrackTags {
            title: credits.title,
            artist,
            album: plan.album,
            album_artist: join_artists(&credits.album_artists, separator),
            year: plan.year,
            genre: plan.genre,
            track_number: plan.track_number,
            lyrics: plan.lyrics,
        }
    }

    /// Tags, cover embedding, rename, autosort and `.lrc` export for one file.
    /// Failures are logged and recorded, never propagated.
    fn apply_pipeline<W: Write>(
        &self,
        path: &Path,
        plan: TrackPlan,
        cover: Option<&[u8]>,
        ui: &mut TreeUi<W>,
        summary: &mut RunSummary,
    ) {
        let tags = self.build_tags(plan);
        let dry_run = self.options.dry_run;
        let lyrics_mode = self.config.defaults.lyrics.mode;

        if dry_run {
            debug!(target: "dry", "Would tag {}: {:?}", path.display(), tags);
        } else {
            if let Err(err) = write_track_tags(path, &tags, lyrics_mode.embeds()) {
                error!("{}: {}", path.display(), err);
                summary.failed.push((path.to_path_buf(), err));
                return;
            }
            if let Some(bytes) = cover {
                if let Err(err) = embed_cover_art(path, bytes) {
                    error!("Cover apply error for {}: {}", path.display(), err);
                }
            }
        }

        let mut final_path = path.to_path_buf();
        if self.options.filesystem.rename {
            ui.step("Renaming...");
            match organize::rename_to_title(&final_path, &tags.title, dry_run) {
                Ok(renamed) => final_path = renamed,
                Err(err) => error!("{}", err),
            }
        }
        if self.options.filesystem.autosort {
            ui.step("Sorting...");
            let sort_artist = tags
                .album_artist
                .split(self.config.separators.artist.as_str())
                .next()
                .and_then(non_empty)
                .or_else(|| {
                    tags.artist
                        .split(self.config.separators.artist.as_str())
                        .next()
                        .and_then(non_empty)
                })
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
            match organize::autosort(&final_path, &sort_artist, &tags.album, dry_run) {
                Ok(sorted) => final_path = sorted,
                Err(err) => error!("{}", err),
            }
        }
        if lyrics_mode.writes_lrc() {
            if let Some(lyrics) = &tags.lyrics {
                if let Err(err) = organize::save_lrc(&final_path, lyrics, dry_run) {
                    error!("{}", err);
                }
            }
        }
        ui.step("Done");

        summary.processed.push(ProcessedTrack {
            source_path: path.to_path_buf(),
            final_path,
            tags,
        });
    }
}

/// Existing tags fill query fields that search and directory inference left open.
fn fill_from_existing_tags(query: &mut BTreeMap<String, String>, existing: &CommonTrackMetadata) {
    for (key, value) in [
        ("title", &existing.title),
        ("artist", &existing.artist),
        ("album", &existing.album),
    ] {
        if let Some(value) = non_empty(value) {
            let has_title = key == "title" && query.contains_key("name");
            if !has_title {
                query.entry(key.to_string()).or_insert(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        fill_from_existing_tags, merge_artists, parse_key_values, AppError, FilesystemOptions,
        RunOptions, Session,
    };
    use crate::config::{Config, FeatHandling};
    use crate::config_persistence::apply_overrides;
    use crate::metadata::metadata_tags::CommonTrackMetadata;
    use crate::prompt::ManualResolver;
    use crate::providers::{AlbumCandidate, AlbumDetails, MetadataSource, SongData, SongQuery};
    use crate::reconcile::{LocalFile, ManualDecision, MatchStrategy, TracklistEntry};
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};

    struct FakeSource {
        candidates: Vec<AlbumCandidate>,
        album: AlbumDetails,
        song: SongData,
        song_queries: RefCell<Vec<SongQuery>>,
        album_searches: RefCell<Vec<String>>,
    }

    impl FakeSource {
        fn new(tracks: Vec<TracklistEntry>) -> Self {
            Self {
                candidates: vec![AlbumCandidate {
                    id: 7,
                    title: "The Upper Hand".to_string(),
                    artist: "AllttA".to_string(),
                    cover_url: None,
                    url: None,
                }],
                album: AlbumDetails {
                    album: "The Upper Hand".to_string(),
                    artist: "AllttA".to_string(),
                    cover_url: None,
                    year: Some("2017".to_string()),
                    genre: Some("Hip Hop".to_string()),
                    tracks,
                },
                song: SongData::default(),
                song_queries: RefCell::new(Vec::new()),
                album_searches: RefCell::new(Vec::new()),
            }
        }
    }

    impl MetadataSource for FakeSource {
        fn search_albums(&self, query: &str) -> Result<Vec<AlbumCandidate>, String> {
            self.album_searches.borrow_mut().push(query.to_string());
            Ok(self.candidates.clone())
        }

        fn fetch_album(&self, _album_id: u64) -> Result<AlbumDetails, String> {
            Ok(self.album.clone())
        }

        fn fetch_lyrics(&self, song_id: u64) -> Result<Option<String>, String> {
            Ok(Some(format!("lyrics for {song_id}")))
        }

        fn fetch_song(&self, query: &SongQuery) -> Result<SongData, String> {
            self.song_queries.borrow_mut().push(query.clone());
            Ok(self.song.clone())
        }

        fn download(&self, _url: &str) -> Result<Vec<u8>, String> {
            Err("offline".to_string())
        }
    }

    #[derive(Default)]
    struct ScriptedResolver {
        album_choice: Option<usize>,
        decisions: Vec<ManualDecision>,
        seen_files: Vec<PathBuf>,
        album_prompts: usize,
    }

    impl ManualResolver for ScriptedResolver {
        fn choose_album(&mut self, _candidates: &[AlbumCandidate]) -> Result<Option<usize>, String> {
            self.album_prompts += 1;
            Ok(self.album_choice)
        }

        fn resolve(
            &mut self,
            files: &[LocalFile],
            _entries: &[TracklistEntry],
        ) -> Result<Vec<ManualDecision>, String> {
            self.seen_files = files.iter().map(|file| file.path.clone()).collect();
            Ok(self.decisions.clone())
        }
    }

    fn entry(position: u32, title: &str, artist: &str) -> TracklistEntry {
        let mut entry = TracklistEntry::new(position, title);
        entry.song_id = Some(u64::from(position) + 100);
        entry.artist = Some(artist.to_string());
        entry
    }

    fn album_fixture(names: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let album_dir = dir.path().join("AllttA").join("The Upper Hand");
        fs::create_dir_all(&album_dir).unwrap();
        for name in names {
            fs::write(album_dir.join(name), b"not really audio").unwrap();
        }
        (dir, album_dir)
    }

    fn dry_run_options(target: &Path, album_mode: bool) -> RunOptions {
        RunOptions {
            target: target.to_path_buf(),
            album_mode,
            filesystem: FilesystemOptions {
                match_filename: true,
                infer_dirs: true,
                ..FilesystemOptions::default()
            },
            dry_run: true,
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_parse_key_values() {
        let parsed = parse_key_values(&[
            "artist=AllttA".to_string(),
            "Album = The Upper Hand".to_string(),
            "broken".to_string(),
            "title=a=b".to_string(),
        ]);
        let expected: BTreeMap<String, String> = [
            ("artist", "AllttA"),
            ("album", "The Upper Hand"),
            ("title", "a=b"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_filesystem_options_parse() {
        let config = Config::default();
        let options = FilesystemOptions::parse(Some("rename, autosort"), &config).unwrap();
        assert!(options.rename);
        assert!(options.autosort);
        assert!(!options.infer_dirs);
        assert!(options.match_filename);
        assert!(FilesystemOptions::parse(Some("shuffle"), &config).is_err());
    }

    #[test]
    fn test_match_filename_off_in_config_selects_positional_matching() {
        let config = apply_overrides(
            &Config::default(),
            &["defaults.match_filename=false".to_string()],
        )
        .unwrap();
        let source = FakeSource::new(Vec::new());

        let options = RunOptions {
            filesystem: FilesystemOptions::parse(None, &config).unwrap(),
            ..RunOptions::default()
        };
        let session = Session::new(&config, &options, &source).unwrap();
        assert_eq!(session.match_options().strategy, MatchStrategy::Positional);

        let options = RunOptions {
            filesystem: FilesystemOptions::parse(Some("match-filename"), &config).unwrap(),
            ..RunOptions::default()
        };
        let session = Session::new(&config, &options, &source).unwrap();
        assert_eq!(session.match_options().strategy, MatchStrategy::Fuzzy);
    }

    #[test]
    fn test_merge_artists_puts_inferred_first() {
        assert_eq!(
            merge_artists(Some("AllttA"), Some("AllttA & Friends")),
            vec!["AllttA".to_string(), "AllttA & Friends".to_string()]
        );
        assert_eq!(merge_artists(Some("AllttA"), Some("AllttA")), vec!["AllttA".to_string()]);
        assert_eq!(merge_artists(None, None), vec!["Unknown".to_string()]);
    }

    #[test]
    fn test_fill_from_existing_tags_only_fills_gaps() {
        let mut query = BTreeMap::from([("artist".to_string(), "Searched".to_string())]);
        let existing = CommonTrackMetadata {
            title: "Tagged Title".to_string(),
            artist: "Tagged Artist".to_string(),
            album: "Tagged Album".to_string(),
            ..CommonTrackMetadata::default()
        };
        fill_from_existing_tags(&mut query, &existing);
        assert_eq!(query["artist"], "Searched");
        assert_eq!(query["title"], "Tagged Title");
        assert_eq!(query["album"], "Tagged Album");
    }

    #[test]
    fn test_album_run_matches_processes_and_asks_for_leftovers() {
        let (_dir, album_dir) = album_fixture(&[
            "01 Intro.mp3",
            "02 The Woods (feat. 20syl).mp3",
            "zz unknown thing.mp3",
        ]);
        let source = FakeSource::new(vec![
            entry(1, "Intro", "AllttA"),
            entry(2, "The Woods (feat. 20syl)", "AllttA"),
            entry(3, "Hidden Track", "AllttA"),
        ]);
        let mut config = Config::default();
        config.defaults.feat_handling = FeatHandling::SplitClean;
        let options = dry_run_options(&album_dir, true);
        let session = Session::new(&config, &options, &source).unwrap();
        let unknown = album_dir.join("zz unknown thing.mp3");
        let mut resolver = ScriptedResolver {
            album_choice: Some(0),
            decisions: vec![ManualDecision::Assign {
                file: unknown.clone(),
                entry_position: 3,
            }],
            ..ScriptedResolver::default()
        };
        let mut output = Vec::new();

        let summary = session.run(&mut resolver, &mut output).unwrap();

        assert!(!summary.aborted);
        assert_eq!(resolver.seen_files, vec![unknown.clone()]);
        assert_eq!(summary.processed.len(), 3);
        assert!(summary.failed.is_empty());
        assert!(summary.unmatched.is_empty());

        let woods = &summary.processed[1].tags;
        assert_eq!(woods.title, "The Woods");
        assert_eq!(woods.artist, "AllttA; 20syl; Mr. J. Medeiros");
        assert_eq!(woods.album_artist, "AllttA; 20syl; Mr. J. Medeiros");
        assert_eq!(woods.track_number, Some(2));
        assert_eq!(woods.year.as_deref(), Some("2017"));
        assert_eq!(woods.lyrics.as_deref(), Some("lyrics for 102"));

        assert_eq!(summary.processed[2].source_path, unknown);
        assert_eq!(summary.processed[2].tags.title, "Hidden Track");
        assert!(album_dir.join("01 Intro.mp3").exists());

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Retagging album: The Upper Hand by AllttA"));
        assert!(printed.contains("└── zz unknown thing.mp3"));
    }

    #[test]
    fn test_album_run_aborts_when_user_declines() {
        let (_dir, album_dir) = album_fixture(&["01 Intro.mp3"]);
        let source = FakeSource::new(vec![entry(1, "Intro", "AllttA")]);
        let config = Config::default();
        let options = dry_run_options(&album_dir, true);
        let session = Session::new(&config, &options, &source).unwrap();
        let mut resolver = ScriptedResolver::default();

        let summary = session.run(&mut resolver, &mut Vec::new()).unwrap();
        assert!(summary.aborted);
        assert!(summary.processed.is_empty());
    }

    #[test]
    fn test_album_run_without_query_aborts() {
        let (_dir, album_dir) = album_fixture(&["01 Intro.mp3"]);
        let source = FakeSource::new(vec![entry(1, "Intro", "AllttA")]);
        let config = Config::default();
        let mut options = dry_run_options(&album_dir, true);
        options.filesystem.infer_dirs = false;
        let session = Session::new(&config, &options, &source).unwrap();

        let summary = session
            .run(&mut ScriptedResolver::default(), &mut Vec::new())
            .unwrap();
        assert!(summary.aborted);
    }

    #[test]
    fn test_album_run_without_audio_files_stops_before_searching() {
        let (_dir, album_dir) = album_fixture(&["cover.jpg", "notes.txt"]);
        let source = FakeSource::new(vec![entry(1, "Intro", "AllttA")]);
        let config = Config::default();
        let options = dry_run_options(&album_dir, true);
        let session = Session::new(&config, &options, &source).unwrap();
        let mut resolver = ScriptedResolver {
            album_choice: Some(0),
            ..ScriptedResolver::default()
        };

        let summary = session.run(&mut resolver, &mut Vec::new()).unwrap();
        assert!(summary.aborted);
        assert!(source.album_searches.borrow().is_empty());
        assert_eq!(resolver.album_prompts, 0);
    }

    #[test]
    fn test_album_run_with_empty_tracklist_is_an_error() {
        let (_dir, album_dir) = album_fixture(&["01 Intro.mp3"]);
        let source = FakeSource::new(Vec::new());
        let config = Config::default();
        let options = dry_run_options(&album_dir, true);
        let session = Session::new(&config, &options, &source).unwrap();
        let mut resolver = ScriptedResolver {
            album_choice: Some(0),
            ..ScriptedResolver::default()
        };

        let result = session.run(&mut resolver, &mut Vec::new());
        assert!(matches!(result, Err(AppError::EmptyTracklist(_))));
    }

    #[test]
    fn test_mode_and_target_kind_must_agree() {
        let (_dir, album_dir) = album_fixture(&["01 Intro.mp3"]);
        let source = FakeSource::new(Vec::new());
        let config = Config::default();

        let single_on_dir = dry_run_options(&album_dir, false);
        let session = Session::new(&config, &single_on_dir, &source).unwrap();
        assert!(matches!(
            session.run(&mut ScriptedResolver::default(), &mut Vec::new()),
            Err(AppError::IsADirectory(_))
        ));

        let album_on_file = dry_run_options(&album_dir.join("01 Intro.mp3"), true);
        let session = Session::new(&config, &album_on_file, &source).unwrap();
        assert!(matches!(
            session.run(&mut ScriptedResolver::default(), &mut Vec::new()),
            Err(AppError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_single_run_uses_cleaned_stem_and_manual_tags() {
        let (_dir, album_dir) = album_fixture(&["03 - The Woods [320kbps].mp3"]);
        let file = album_dir.join("03 - The Woods [320kbps].mp3");
        let mut source = FakeSource::new(Vec::new());
        source.song = SongData {
            title: Some("The Woods".to_string()),
            artist: Some("AllttA".to_string()),
            album: Some("The Upper Hand".to_string()),
            lyrics: Some("words".to_string()),
            ..SongData::default()
        };
        let config = Config::default();
        let mut options = dry_run_options(&file, false);
        options.manual_tags = BTreeMap::from([
            ("year".to_string(), "2016".to_string()),
            ("genre".to_string(), "Hip Hop, Jazz".to_string()),
            ("artist".to_string(), "AllttA; Oddisee; AllttA".to_string()),
        ]);
        options.filesystem.rename = true;
        let session = Session::new(&config, &options, &source).unwrap();

        let summary = session
            .run(&mut ScriptedResolver::default(), &mut Vec::new())
            .unwrap();

        let queries = source.song_queries.borrow();
        assert_eq!(queries[0].title.as_deref(), Some("The Woods"));
        assert_eq!(queries[0].artist.as_deref(), Some("AllttA"));
        assert_eq!(summary.processed.len(), 1);
        let processed = &summary.processed[0];
        assert_eq!(processed.tags.title, "The Woods");
        assert_eq!(processed.tags.year.as_deref(), Some("2016"));
        assert_eq!(processed.tags.genre.as_deref(), Some("Hip Hop; Jazz"));
        assert_eq!(processed.tags.track_number, Some(3));
        assert_eq!(
            processed.tags.artist,
            "AllttA; 20syl; Mr. J. Medeiros; Oddisee; Amir Mohamed el Khalifa"
        );
        assert_eq!(processed.final_path, album_dir.join("The Woods.mp3"));
        assert!(file.exists());
    }
}

mod app;
mod config;
mod config_persistence;
mod cover_art;
mod credentials;
mod credits;
mod debug_options;
mod media_file_discovery;
mod metadata;
mod organize;
mod progress;
mod prompt;
mod providers;
mod reconcile;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error};

use app::{parse_key_values, FilesystemOptions, RunOptions, Session};
use config::{FeatHandling, LyricsMode};
use config_persistence::{
    apply_overrides, get_config_file_value, load_config_file, set_config_file_value,
    split_assignment,
};
use cover_art::{parse_cover_source, CoverSource};
use debug_options::{init_logging, parse_debug_option, DebugOptions};
use prompt::TerminalResolver;
use providers::genius::GeniusClient;
use providers::http::HttpClient;
use providers::OnlineMetadataSource;

const ABOUT: &str = "Tags audio files with metadata, lyrics and cover art from Genius and MusicBrainz.";

const AFTER_LONG_HELP: &str = "\
Examples:
  swisstag song.mp3 -F split-clean
  swisstag song.flac -s url=https://genius.com/Alltta-the-woods-lyrics
  swisstag ~/Music/AllttA/Curio --album -f infer-dirs,rename -c auto
  swisstag -C get api_keys.genius
  swisstag -C set defaults.rename=true";

#[derive(Debug, Parser)]
#[command(name = "swisstag", version, about = ABOUT, after_long_help = AFTER_LONG_HELP)]
struct Cli {
    /// File to tag, or the album directory with --album
    #[arg(default_value = ".")]
    file: PathBuf,

    /// Album mode: tag every file in a directory against one album tracklist
    #[arg(
        short,
        long,
        long_help = "Album mode.\n\n\
            Searches Genius for the album and asks which candidate is right, fetches the \
            full tracklist, then matches the local files to it. Files are matched by \
            file name similarity (or by position, see --filesystem); files left over are \
            matched interactively. Every file gets consistent album, year and track numbers.\n\n\
            Needs either `-f infer-dirs` or `-s artist=.. album=..` to know which album to fetch."
    )]
    album: bool,

    /// Explicit search values: name=, artist=, album=, url=
    #[arg(
        short,
        long,
        num_args = 1..,
        value_name = "KEY=VALUE",
        long_help = "Explicit search values, bypassing tags and directory names.\n\n\
            Keys:\n  \
            name=<song or album name>\n  \
            artist=<artist name>\n  \
            album=<album name>\n  \
            url=<Genius song URL> (skips the search)"
    )]
    search: Vec<String>,

    /// Override tags: title, artist, album, album_artist, year, genre, track_number
    #[arg(
        short = 't',
        long,
        num_args = 1..,
        value_name = "TAG=VALUE",
        long_help = "Tag values applied right before saving, replacing fetched data.\n\n\
            Tags: title, artist, album, album_artist, year, genre, track_number, lyrics.\n\
            A comma list given to genre is joined with `separators.genre`."
    )]
    manual_tags: Vec<String>,

    /// How featured artists in titles are handled
    #[arg(short = 'F', long, value_enum)]
    feat_handling: Option<FeatHandling>,

    /// Comma list of: rename, match-filename, infer-dirs, autosort
    #[arg(
        short = 'f',
        long,
        value_name = "OPTIONS",
        long_help = "Filesystem operations, comma separated.\n\n  \
            rename          rename files to their clean track title\n  \
            match-filename  (album mode) match files to tracks by name instead of position\n  \
            infer-dirs      take artist and album from the parent directories\n  \
            autosort        move tagged files into <library>/<artist>/<album>/\n\n\
            `defaults.rename` and `defaults.match_filename` in the config switch rename and \
            match-filename on for every run. match_filename is on in the default config, so \
            name matching is the default; position matching needs \
            `-S defaults.match_filename=false` or the same value in the config file."
    )]
    filesystem: Option<String>,

    /// Cover art source: auto, file=PATH, extract
    #[arg(
        short,
        long,
        value_name = "MODE",
        value_parser = parse_cover_source,
        long_help = "Cover art source.\n\n  \
            auto        download the album or song cover\n  \
            file=PATH   use a local image\n  \
            extract     use the picture embedded in the (first) file\n\n\
            The cover is embedded and saved to `Cover Art/<album>.jpg` next to the files."
    )]
    cover_art: Option<CoverSource>,

    /// Where lyrics go
    #[arg(short, long, value_enum)]
    lyrics: Option<LyricsMode>,

    /// Debug channels: dry, network, cmd, vars, config, all
    #[arg(
        short,
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "dry",
        value_name = "CHANNELS",
        long_help = "Debug output.\n\n\
            `--debug` on its own is a DRY RUN: nothing is written.\n\
            With channels (`-d=network,vars`) the run is LIVE.\n\n  \
            dry      show actions without making changes\n  \
            network  requests and responses\n  \
            cmd      shell equivalents of file operations\n  \
            vars     internal values\n  \
            config   configuration handling\n  \
            all      every channel except dry (LIVE RUN)"
    )]
    debug: Option<Option<String>>,

    /// Config file actions: get KEY | set KEY VALUE | set KEY=VALUE
    #[arg(short = 'C', long = "config", num_args = 1..=3, value_name = "ACTION")]
    config_action: Option<Vec<String>>,

    /// Override config values for this run only
    #[arg(short = 'S', long = "set", num_args = 1.., value_name = "KEY=VALUE")]
    temp_set: Vec<String>,

    /// Store a Genius API token in the system keyring
    #[arg(long)]
    setup_token: bool,

    /// Print version information
    #[arg(long)]
    about: bool,
}

fn run_config_action(path: &Path, action: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        [verb, key] if verb == "get" => {
            println!("{}", get_config_file_value(path, key)?);
        }
        [verb, assignment] if verb == "set" => {
            let (key, value) = split_assignment(assignment)?;
            set_config_file_value(path, key, value)?;
            println!("Set {key} to {value}");
        }
        [verb, key, value] if verb == "set" => {
            set_config_file_value(path, key, value)?;
            println!("Set {key} to {value}");
        }
        _ => return Err("expected `get KEY`, `set KEY VALUE` or `set KEY=VALUE`".into()),
    }
    Ok(())
}

fn run_setup_token() -> Result<(), Box<dyn std::error::Error>> {
    let http = HttpClient::new();
    credentials::open_api_clients_page();
    let stdin = io::stdin();
    let saved = credentials::run_token_wizard(
        &mut stdin.lock(),
        &mut io::stdout(),
        |token| GeniusClient::new(token.to_string()).validate(&http),
        credentials::set_genius_token,
    )?;
    if !saved {
        println!("No token stored.");
    }
    Ok(())
}

fn run(cli: Cli, debug: &DebugOptions) -> Result<(), Box<dyn std::error::Error>> {
    if cli.about {
        println!("swisstag v{}", env!("CARGO_PKG_VERSION"));
        println!("{ABOUT}");
        return Ok(());
    }

    let config_path = config::config_file_path().ok_or(config_persistence::ConfigError::NoConfigDir)?;
    if let Some(action) = &cli.config_action {
        return run_config_action(&config_path, action);
    }
    if cli.setup_token {
        return run_setup_token();
    }

    let mut config = apply_overrides(&load_config_file(&config_path)?, &cli.temp_set)?;
    if let Some(mode) = cli.lyrics {
        config.defaults.lyrics.mode = mode;
    }
    if let Some(mode) = cli.feat_handling {
        config.defaults.feat_handling = mode;
    }
    debug!(target: "config", "Effective config: {:?}", config);

    let target = std::fs::canonicalize(&cli.file).unwrap_or(cli.file);
    let options = RunOptions {
        target,
        album_mode: cli.album,
        search: parse_key_values(&cli.search),
        manual_tags: parse_key_values(&cli.manual_tags),
        filesystem: FilesystemOptions::parse(cli.filesystem.as_deref(), &config)?,
        cover: cli.cover_art,
        dry_run: debug.is_dry_run(),
    };

    let source = OnlineMetadataSource::new(
        credentials::resolve_genius_token(&config),
        config.blacklisted_genres.clone(),
    );
    let session = Session::new(&config, &options, &source)?;
    let mut resolver = TerminalResolver::stdio();
    let summary = session.run(&mut resolver, &mut io::stdout())?;

    for path in &summary.unmatched {
        println!("Not tagged: {}", path.display());
    }
    if !summary.failed.is_empty() {
        return Err(format!("{} file(s) failed", summary.failed.len()).into());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = match cli.debug.as_ref().map(|value| parse_debug_option(value.as_deref())) {
        Some(Ok(options)) => options,
        Some(Err(err)) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
        None => DebugOptions::default(),
    };
    init_logging(&debug);
    if debug.is_dry_run() {
        println!("DRY RUN: no files will be changed.");
    }

    match run(cli, &debug) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

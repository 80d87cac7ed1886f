//! Genius token storage in the OS keyring and the interactive setup wizard.

use std::io::{BufRead, Write};

use keyring::Entry;
use log::{debug, warn};

use crate::config::Config;

const KEYRING_SERVICE_NAME: &str = "swisstag";
const KEYRING_USER: &str = "genius";
const TOKEN_ENV_VAR: &str = "GENIUS_ACCESS_TOKEN";
pub const GENIUS_API_CLIENTS_URL: &str = "https://genius.com/api-clients";

fn genius_entry() -> Result<Entry, String> {
    Entry::new(KEYRING_SERVICE_NAME, KEYRING_USER)
        .map_err(|err| format!("failed to create keyring entry: {err}"))
}

/// Saves the Genius access token into the OS keyring.
pub fn set_genius_token(token: &str) -> Result<(), String> {
    genius_entry()?
        .set_password(token)
        .map_err(|err| format!("failed to set keyring password: {err}"))
}

/// Loads the Genius access token from the OS keyring.
pub fn get_genius_token() -> Result<Option<String>, String> {
    match genius_entry()?.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(format!("failed to get keyring password: {err}")),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Keyring first, then `api_keys.genius`, then the environment.
pub fn choose_genius_token(
    keyring_token: Option<String>,
    config: &Config,
    env_token: Option<String>,
) -> Option<String> {
    keyring_token
        .as_deref()
        .and_then(non_empty)
        .or_else(|| non_empty(&config.api_keys.genius))
        .or_else(|| env_token.as_deref().and_then(non_empty))
}

pub fn resolve_genius_token(config: &Config) -> Option<String> {
    let keyring_token = get_genius_token().unwrap_or_else(|err| {
        warn!("Keyring unavailable: {}", err);
        None
    });
    let token = choose_genius_token(keyring_token, config, std::env::var(TOKEN_ENV_VAR).ok());
    debug!(target: "config", "Genius token present: {}", token.is_some());
    token
}

pub fn open_api_clients_page() {
    if let Err(err) = webbrowser::open(GENIUS_API_CLIENTS_URL) {
        debug!("Could not open a browser: {}", err);
    }
}

/// Walks the user through creating a Genius client token. `validate` checks a
/// candidate token and `store` persists an accepted one. Returns whether a
/// token was stored.
pub fn run_token_wizard<R, W, V, S>(
    input: &mut R,
    output: &mut W,
    mut validate: V,
    mut store: S,
) -> Result<bool, String>
where
    R: BufRead,
    W: Write,
    V: FnMut(&str) -> Result<bool, String>,
    S: FnMut(&str) -> Result<(), String>,
{
    let io_error = |err: std::io::Error| format!("terminal I/O failed: {err}");
    writeln!(output, "Genius API token setup").map_err(io_error)?;
    writeln!(
        output,
        "Create an API client at {GENIUS_API_CLIENTS_URL} and generate a client access token."
    )
    .map_err(io_error)?;

    loop {
        write!(output, "Paste the access token (empty to cancel): ").map_err(io_error)?;
        output.flush().map_err(io_error)?;
        let mut line = String::new();
        if input.read_line(&mut line).map_err(io_error)? == 0 {
            return Ok(false);
        }
        let Some(token) = non_empty(&line) else {
            writeln!(output, "Cancelled.").map_err(io_error)?;
            return Ok(false);
        };

        writeln!(output, "Validating token...").map_err(io_error)?;
        match validate(&token) {
            Ok(true) => {
                store(&token)?;
                writeln!(output, "Token saved.").map_err(io_error)?;
                return Ok(true);
            }
            Ok(false) => writeln!(output, "Genius rejected this token, try again.").map_err(io_error)?,
            Err(err) => writeln!(output, "Could not validate token: {err}").map_err(io_error)?,
        }
    }
}

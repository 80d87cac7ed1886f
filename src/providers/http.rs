//! Blocking HTTP plumbing shared by the metadata providers.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

pub const USER_AGENT: &str = concat!("swisstag/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFailureKind {
    Timeout,
    RateLimited,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub kind: HttpFailureKind,
    pub message: String,
}

impl HttpFailure {
    fn hard(message: impl Into<String>) -> Self {
        Self {
            kind: HttpFailureKind::Hard,
            message: message.into(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            HttpFailureKind::Timeout | HttpFailureKind::RateLimited
        )
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn classify_ureq_failure(error: &ureq::Error) -> HttpFailureKind {
    match error {
        ureq::Error::Status(code, _) => match code {
            429 => HttpFailureKind::RateLimited,
            408 | 500 | 502 | 503 | 504 => HttpFailureKind::Timeout,
            _ => HttpFailureKind::Hard,
        },
        ureq::Error::Transport(transport) => {
            let lowered = transport.to_string().to_ascii_lowercase();
            if lowered.contains("timed out") || lowered.contains("timeout") {
                HttpFailureKind::Timeout
            } else {
                HttpFailureKind::Hard
            }
        }
    }
}

fn classify_io_failure(error: &std::io::Error) -> HttpFailureKind {
    let timed_out = matches!(
        error.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    ) || error.to_string().to_ascii_lowercase().contains("timed out");
    if timed_out {
        HttpFailureKind::Timeout
    } else {
        HttpFailureKind::Hard
    }
}

/// Linear backoff: `base * attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(attempt).unwrap_or(base)
}

/// Runs `operation` until it succeeds, fails hard, or `max_attempts` is reached.
/// Timeouts and rate limits are retried after a linear backoff.
pub fn execute_with_backoff<T, F>(
    max_attempts: u32,
    base_delay: Duration,
    label: &str,
    mut operation: F,
) -> Result<T, HttpFailure>
where
    F: FnMut() -> Result<T, HttpFailure>,
{
    let mut attempt = 1u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(failure) if failure.is_retryable() && attempt < max_attempts => {
                let backoff = backoff_delay(base_delay, attempt);
                warn!(
                    "{} attempt {} failed ({}), retrying in {:?}",
                    label, attempt, failure, backoff
                );
                std::thread::sleep(backoff);
                attempt = attempt.saturating_add(1);
            }
            Err(failure) => return Err(failure),
        }
    }
}

/// Appends URL-encoded query parameters to `base`.
pub fn request_url(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    for (index, (key, value)) in params.iter().enumerate() {
        url.push(if index == 0 { '?' } else { '&' });
        url.push_str(key);
        url.push('=');
        url.push_str(urlencoding::encode(value).as_ref());
    }
    url
}

pub struct HttpClient {
    agent: ureq::Agent,
    max_attempts: u32,
    backoff_base: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            max_attempts: MAX_ATTEMPTS,
            backoff_base: BACKOFF_BASE,
        }
    }

    fn get_bytes_once(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, HttpFailure> {
        debug!(target: "network", "GET {}", url);
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = request.call().map_err(|error| HttpFailure {
            kind: classify_ureq_failure(&error),
            message: format!("Request failed: {error}"),
        })?;
        debug!(target: "network", "{} {}", response.status(), url);

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|error| HttpFailure {
                kind: classify_io_failure(&error),
                message: format!("Failed to read response: {error}"),
            })?;
        Ok(body)
    }

    pub fn get_bytes(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, String> {
        execute_with_backoff(self.max_attempts, self.backoff_base, url, || {
            self.get_bytes_once(url, headers)
        })
        .map_err(|failure| failure.message)
    }

    pub fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, String> {
        let body = self.get_bytes(url, headers)?;
        String::from_utf8(body).map_err(|error| format!("Response is not UTF-8: {error}"))
    }

    pub fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, String> {
        execute_with_backoff(self.max_attempts, self.backoff_base, url, || {
            let body = self.get_bytes_once(url, headers)?;
            serde_json::from_slice::<Value>(&body)
                .map_err(|error| HttpFailure::hard(format!("Invalid JSON response: {error}")))
        })
        .map_err(|failure| failure.message)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        backoff_delay, classify_ureq_failure, execute_with_backoff, request_url, HttpFailure,
        HttpFailureKind,
    };
    use std::cell::Cell;
    use std::time::Duration;

    fn status_error(code: u16) -> ureq::Error {
        let response = ureq::Response::new(code, "status", "").expect("response should build");
        ureq::Error::Status(code, response)
    }

    fn failure(kind: HttpFailureKind) -> HttpFailure {
        HttpFailure {
            kind,
            message: format!("{kind:?}"),
        }
    }

    #[test]
    fn test_classify_ureq_failure_by_status() {
        assert_eq!(
            classify_ureq_failure(&status_error(429)),
            HttpFailureKind::RateLimited
        );
        assert_eq!(
            classify_ureq_failure(&status_error(503)),
            HttpFailureKind::Timeout
        );
        assert_eq!(
            classify_ureq_failure(&status_error(404)),
            HttpFailureKind::Hard
        );
    }

    #[test]
    fn test_backoff_delay_is_linear() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
    }

    #[test]
    fn test_execute_with_backoff_retries_timeouts_up_to_limit() {
        let calls = Cell::new(0);
        let result: Result<(), HttpFailure> =
            execute_with_backoff(3, Duration::ZERO, "test", || {
                calls.set(calls.get() + 1);
                Err(failure(HttpFailureKind::Timeout))
            });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_execute_with_backoff_stops_on_hard_failure() {
        let calls = Cell::new(0);
        let result: Result<(), HttpFailure> =
            execute_with_backoff(3, Duration::ZERO, "test", || {
                calls.set(calls.get() + 1);
                Err(failure(HttpFailureKind::Hard))
            });
        assert_eq!(result.unwrap_err().kind, HttpFailureKind::Hard);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_execute_with_backoff_returns_first_success() {
        let calls = Cell::new(0);
        let result = execute_with_backoff(3, Duration::ZERO, "test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(failure(HttpFailureKind::RateLimited))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn test_request_url_encodes_params() {
        assert_eq!(
            request_url("https://api.example/search", &[("q", "AllttA The Woods"), ("per_page", "5")]),
            "https://api.example/search?q=AllttA%20The%20Woods&per_page=5"
        );
        assert_eq!(request_url("https://x/y", &[]), "https://x/y");
    }
}

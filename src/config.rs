//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with defaults matching the server's
//! stock realtime endpoint.

use std::time::Duration;

use crate::client::backoff::{DEFAULT_RECONNECT_INTERVALS_MS, ReconnectPolicy};
use crate::error::RealtimeError;

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Server base URL (e.g. `http://127.0.0.1:8090`).
    pub base_url: String,

    /// Path of the realtime endpoint, used for the stream and the submit.
    pub realtime_path: String,

    /// Window in which the server must send its connect event.
    pub connect_timeout: Duration,

    /// Reconnect delay table and attempt ceiling.
    pub reconnect: ReconnectPolicy,

    /// Capacity of the command channel into the connection manager.
    pub command_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            realtime_path: "/api/realtime".to_string(),
            connect_timeout: Duration::from_millis(15_000),
            reconnect: ReconnectPolicy::default(),
            command_buffer: 256,
        }
    }
}

impl RealtimeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `REALTIME_BASE_URL` is not an
    /// absolute URL or `REALTIME_RECONNECT_INTERVALS_MS` is not a
    /// non-empty comma-separated list of milliseconds.
    pub fn from_env() -> Result<Self, RealtimeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`RealtimeConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RealtimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup("REALTIME_BASE_URL").unwrap_or(defaults.base_url);
        reqwest::Url::parse(&base_url)
            .map_err(|err| {
                RealtimeError::Config(format!("REALTIME_BASE_URL {base_url:?}: {err}"))
            })?;

        let realtime_path = lookup("REALTIME_PATH").unwrap_or(defaults.realtime_path);

        let connect_timeout = Duration::from_millis(parse_value(
            lookup("REALTIME_CONNECT_TIMEOUT_MS"),
            15_000,
        ));

        let intervals = match lookup("REALTIME_RECONNECT_INTERVALS_MS") {
            Some(raw) => parse_intervals(&raw)?,
            None => DEFAULT_RECONNECT_INTERVALS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        };
        let max_attempts = lookup("REALTIME_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse().ok());
        let reconnect = ReconnectPolicy::new(intervals, max_attempts)?;

        let command_buffer = parse_value(lookup("REALTIME_COMMAND_BUFFER"), 256).max(1);

        Ok(Self {
            base_url,
            realtime_path,
            connect_timeout,
            reconnect,
            command_buffer,
        })
    }
}

/// Parses an optional raw value as `T`, returning `default` on missing or
/// invalid values.
fn parse_value<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Parses `"200, 300,500"` into durations.
fn parse_intervals(raw: &str) -> Result<Vec<Duration>, RealtimeError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                RealtimeError::Config(format!(
                    "REALTIME_RECONNECT_INTERVALS_MS: {part:?} is not a number of milliseconds"
                ))
            })
        })
        .collect()
}

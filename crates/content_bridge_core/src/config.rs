//! Bridge runtime configuration.
//!
//! # Responsibility
//! - Hold the limits that bound memory use on the bulk and streaming paths.
//! - Load overrides from process environment with strict parsing.
//!
//! # Invariants
//! - Blank environment values fall back to defaults.
//! - Malformed values are rejected instead of silently ignored.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_MAX_BULK_BYTES: &str = "CONTENT_BRIDGE_MAX_BULK_BYTES";
pub const ENV_MAX_LIVE_BYTES: &str = "CONTENT_BRIDGE_MAX_LIVE_BYTES";
pub const ENV_MAX_STREAM_BUFFER: &str = "CONTENT_BRIDGE_MAX_STREAM_BUFFER";
pub const ENV_ACK_TIMEOUT_MS: &str = "CONTENT_BRIDGE_ACK_TIMEOUT_MS";

const DEFAULT_MAX_BULK_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MAX_STREAM_BUFFER: usize = 4 * 1024 * 1024;
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Limits applied by the arena, bulk transfer and streaming sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Largest content `getContent` will materialize.
    pub max_bulk_bytes: usize,
    /// Ceiling across all live arena buffers; `None` means unlimited.
    pub max_live_bytes: Option<usize>,
    /// Largest working buffer a stream session may request.
    pub max_stream_buffer_size: usize,
    /// How long a session waits for one chunk acknowledgment.
    pub ack_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_bulk_bytes: DEFAULT_MAX_BULK_BYTES,
            max_live_bytes: None,
            max_stream_buffer_size: DEFAULT_MAX_STREAM_BUFFER,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from `CONTENT_BRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = parse_usize(&lookup, ENV_MAX_BULK_BYTES)? {
            config.max_bulk_bytes = value;
        }
        if let Some(value) = parse_usize(&lookup, ENV_MAX_LIVE_BYTES)? {
            config.max_live_bytes = Some(value);
        }
        if let Some(value) = parse_usize(&lookup, ENV_MAX_STREAM_BUFFER)? {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    key: ENV_MAX_STREAM_BUFFER,
                    value: value.to_string(),
                });
            }
            config.max_stream_buffer_size = value;
        }
        if let Some(value) = parse_usize(&lookup, ENV_ACK_TIMEOUT_MS)? {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    key: ENV_ACK_TIMEOUT_MS,
                    value: value.to_string(),
                });
            }
            config.ack_timeout = Duration::from_millis(value as u64);
        }

        Ok(config)
    }
}

fn parse_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<usize>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber {
            key,
            value: trimmed.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    OutOfRange { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer, got `{value}`")
            }
            Self::OutOfRange { key, value } => write!(f, "{key} is out of range: `{value}`"),
        }
    }
}

impl Error for ConfigError {}

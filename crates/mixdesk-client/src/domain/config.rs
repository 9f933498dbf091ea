//! Client configuration types and TOML file loading.
//!
//! [`ClientConfig`] is the single source of truth for all runtime settings.
//! Construct it in code (the `Default` values suit local development and
//! tests) or load it from a TOML file:
//!
//! ```toml
//! url = "ws://192.168.1.40:80/socket"
//! call_timeout_ms = 5000
//!
//! [reconnect]
//! base_ms = 250
//! cap_ms = 10000
//! jitter_fraction = 0.25
//! max_attempts = 10
//! max_elapsed_ms = 120000
//!
//! [limits]
//! outbound_queue = 64
//! subscription_buffer = 128
//! event_buffer = 32
//! ```
//!
//! Every field is optional except `url`; missing fields take the defaults
//! below, so an old config file keeps working when newer fields appear.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bounds and shape of the reconnect backoff schedule.
///
/// The delay before attempt `n` (0-based) is
/// `min(cap, base * 2^n) * (1 ± jitter_fraction)`.  A recovery episode ends
/// in failure once `max_attempts` connect attempts have been made or
/// `max_elapsed` wall-clock time has passed since the disconnect — whichever
/// bound is hit first.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Randomisation applied to each delay, as a fraction of the delay.
    /// `0.25` means each delay varies by ±25%.  Clamped to `0.0..=1.0`.
    pub jitter_fraction: f64,
    /// Total reconnect attempts before giving up.
    pub max_attempts: u32,
    /// Wall-clock budget for the whole recovery episode.
    pub max_elapsed: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            cap: Duration::from_secs(10),
            jitter_fraction: 0.25,
            max_attempts: 10,
            max_elapsed: Duration::from_secs(120),
        }
    }
}

/// All runtime configuration for the protocol client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the console's control socket,
    /// e.g. `ws://192.168.1.40:80/socket`.
    pub url: String,

    /// Reconnect backoff bounds.
    pub reconnect: ReconnectPolicy,

    /// Timeout applied to the client's own internal calls (subscribe,
    /// unsubscribe, resubscribe replay).  Callers of
    /// [`call`](crate::ConsoleClient::call) pass their own timeout per call.
    pub call_timeout: Duration,

    /// Capacity of the serialized outbound frame queue.
    pub outbound_queue: usize,

    /// Capacity of each subscription's update channel.  When a consumer
    /// falls this far behind, further pushes for it are dropped so a slow
    /// consumer can never stall the socket read loop.
    pub subscription_buffer: usize,

    /// Capacity of the lifecycle event broadcast channel.
    pub event_buffer: usize,

    /// How often the pending-request table is swept for overdue entries.
    pub expiry_sweep_interval: Duration,
}

impl ClientConfig {
    /// Creates a config for `url` with default tuning.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            call_timeout: Duration::from_secs(5),
            outbound_queue: 64,
            subscription_buffer: 128,
            event_buffer: 32,
            expiry_sweep_interval: Duration::from_millis(250),
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid TOML or is missing `url`.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ClientConfigFile = toml::from_str(text)?;
        Ok(file.into())
    }
}

// ── TOML file schema ──────────────────────────────────────────────────────────
//
// The on-disk schema uses integer milliseconds for durations and nests the
// tuning knobs in [reconnect] and [limits] tables.  Separate structs keep
// serde defaults out of the runtime types.

#[derive(Debug, Deserialize)]
struct ClientConfigFile {
    url: String,
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
    #[serde(default)]
    reconnect: ReconnectFile,
    #[serde(default)]
    limits: LimitsFile,
}

#[derive(Debug, Deserialize)]
struct ReconnectFile {
    #[serde(default = "default_base_ms")]
    base_ms: u64,
    #[serde(default = "default_cap_ms")]
    cap_ms: u64,
    #[serde(default = "default_jitter_fraction")]
    jitter_fraction: f64,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_max_elapsed_ms")]
    max_elapsed_ms: u64,
}

impl Default for ReconnectFile {
    fn default() -> Self {
        // Route through serde so the table-absent and field-absent cases
        // share one set of defaults.
        toml::from_str("").unwrap()
    }
}

#[derive(Debug, Deserialize)]
struct LimitsFile {
    #[serde(default = "default_outbound_queue")]
    outbound_queue: usize,
    #[serde(default = "default_subscription_buffer")]
    subscription_buffer: usize,
    #[serde(default = "default_event_buffer")]
    event_buffer: usize,
}

impl Default for LimitsFile {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

fn default_call_timeout_ms() -> u64 {
    5_000
}
fn default_base_ms() -> u64 {
    250
}
fn default_cap_ms() -> u64 {
    10_000
}
fn default_jitter_fraction() -> f64 {
    0.25
}
fn default_max_attempts() -> u32 {
    10
}
fn default_max_elapsed_ms() -> u64 {
    120_000
}
fn default_outbound_queue() -> usize {
    64
}
fn default_subscription_buffer() -> usize {
    128
}
fn default_event_buffer() -> usize {
    32
}

impl From<ClientConfigFile> for ClientConfig {
    fn from(file: ClientConfigFile) -> Self {
        let mut config = ClientConfig::new(file.url);
        config.call_timeout = Duration::from_millis(file.call_timeout_ms);
        config.reconnect = ReconnectPolicy {
            base: Duration::from_millis(file.reconnect.base_ms),
            cap: Duration::from_millis(file.reconnect.cap_ms),
            jitter_fraction: file.reconnect.jitter_fraction,
            max_attempts: file.reconnect.max_attempts,
            max_elapsed: Duration::from_millis(file.reconnect.max_elapsed_ms),
        };
        config.outbound_queue = file.limits.outbound_queue;
        config.subscription_buffer = file.limits.subscription_buffer;
        config.event_buffer = file.limits.event_buffer;
        config
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

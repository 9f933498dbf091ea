//! Well-known wire paths and console value-path validation.
//!
//! The console addresses everything with REST-style paths.  This module
//! centralises the handful of paths the protocol layer itself must know
//! (subscribe/unsubscribe endpoints, the metering push prefix, the app-state
//! push path) and the syntax rules for console value paths.
//!
//! The full value/parameter catalog lives in the console; this client only
//! validates *syntax* before a path goes on the wire, so an obviously broken
//! path fails locally instead of producing a silent no-op subscription.

use thiserror::Error;

/// Subscribe endpoint for console value pushes.
pub const VALUE_SUBSCRIBE_PATH: &str = "/console/data/subscribe";
/// Unsubscribe endpoint for console value pushes.
pub const VALUE_UNSUBSCRIBE_PATH: &str = "/console/data/unsubscribe";
/// Metering session root.  Subscribing POSTs here; pushes arrive on
/// `/console/metering2/{id}`.
pub const METERING_PATH: &str = "/console/metering2";
/// Application-state push path.  State notifications arrive unsolicited on
/// this path once an app-state subscription exists.
pub const APP_STATE_PATH: &str = "/app/state";
/// Subscribe endpoint for application-state notifications.
pub const APP_STATE_SUBSCRIBE_PATH: &str = "/app/state/subscribe";
/// Unsubscribe endpoint for application-state notifications.
pub const APP_STATE_UNSUBSCRIBE_PATH: &str = "/app/state/unsubscribe";

/// Errors from console value-path validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path is the empty string.
    #[error("value path is empty")]
    Empty,

    /// The path does not start with `/`.
    #[error("value path must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    /// The path contains an empty segment (`//` or a trailing `/`).
    #[error("value path contains an empty segment: {0:?}")]
    EmptySegment(String),

    /// The path contains whitespace or a control character.
    #[error("value path contains invalid character {ch:?} at byte {index}")]
    InvalidCharacter { ch: char, index: usize },
}

/// Returns the push path for a metering subscription id.
///
/// Metering frames for subscription `7` arrive on `/console/metering2/7`.
pub fn metering_push_path(id: u32) -> String {
    format!("{METERING_PATH}/{id}")
}

/// Parses a metering push path back into its subscription id.
///
/// Returns `None` for any path that is not exactly `/console/metering2/{id}`
/// with a decimal id — including the bare metering root (which is the
/// subscribe endpoint, not a push path).
pub fn parse_metering_push(path: &str) -> Option<u32> {
    let rest = path.strip_prefix(METERING_PATH)?;
    let id = rest.strip_prefix('/')?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    id.parse().ok()
}

/// Validates the syntax of a console value path.
///
/// Accepts paths of the form `/segment/segment/...` where segments are
/// non-empty and free of whitespace and control characters.  The console's
/// catalog decides whether the path actually *exists*; that check happens
/// server-side when the subscription or call is issued.
///
/// # Errors
///
/// Returns the first [`PathError`] encountered scanning left to right.
pub fn validate_value_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if !path.starts_with('/') {
        return Err(PathError::MissingLeadingSlash(path.to_string()));
    }
    for (index, ch) in path.char_indices() {
        if ch.is_whitespace() || ch.is_control() {
            return Err(PathError::InvalidCharacter { ch, index });
        }
    }
    // `skip(1)` steps over the empty string before the leading slash.
    if path.split('/').skip(1).any(str::is_empty) {
        return Err(PathError::EmptySegment(path.to_string()));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

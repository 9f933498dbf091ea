//! The wire envelope: the `{path, method, body}` unit exchanged over the socket.
//!
//! The console API is REST-over-WebSocket.  Every text frame on the socket is
//! one JSON envelope, whether it is an outbound request, an inbound reply, or
//! an unsolicited push.  Example frames:
//!
//! ```json
//! {"path":"/app/connect","method":"POST","body":{"app":"mixdesk"}}
//! {"path":"/console/metering2/7","method":"POST","body":{"b":"EGg"}}
//! ```
//!
//! # Correlation
//!
//! The protocol carries **no request id**.  A reply is matched to its request
//! purely by `(path, method)` plus FIFO issue order; that bookkeeping is the
//! pending-request table's job in `mixdesk-client`, not the codec's.  Encoding
//! and decoding here are pure functions over the frame text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the envelope codec.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not valid JSON, or lacks the required `path`/`method`
    /// fields.  The connection survives a malformed frame; the frame itself
    /// is dropped.
    #[error("malformed frame: {detail}")]
    MalformedFrame { detail: String },

    /// The envelope could not be serialized to JSON.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// One wire unit sent or received over the control socket.
///
/// `body` is deliberately an opaque [`serde_json::Value`]: the envelope layer
/// multiplexes traffic and does not interpret payloads.  Typed decoding (for
/// example of metering bodies) happens downstream, once the frame has been
/// routed to whoever subscribed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// REST-style resource path, e.g. `/console/data/subscribe`.
    pub path: String,
    /// REST verb, e.g. `GET` or `POST`.  Carried as a string; the console
    /// defines the accepted set per path.
    pub method: String,
    /// Opaque JSON payload.  Absent on the wire decodes as JSON `null`.
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Envelope {
    /// Builds an envelope from its parts.
    pub fn new(path: impl Into<String>, method: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            body,
        }
    }

    /// Serializes the envelope to the text-frame payload.
    ///
    /// Pure and deterministic: the same envelope always encodes to the same
    /// frame text.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialize`] if the body contains a value JSON
    /// cannot represent (e.g. a non-finite float smuggled into a `Value`).
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Serialize)
    }

    /// Parses a received text frame into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MalformedFrame`] when the frame is not valid
    /// JSON or lacks `path`/`method`.
    pub fn decode(frame: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(frame).map_err(|e| EnvelopeError::MalformedFrame {
            detail: e.to_string(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

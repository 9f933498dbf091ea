//! Decoding of real-time metering pushes.
//!
//! A metering subscription asks the console to stream level samples at a fixed
//! interval.  Each push arrives on `/console/metering2/{id}` with one of two
//! body encodings, chosen by the `binary` flag at subscribe time:
//!
//! - **JSON**: `{"v": [[-12.4, -13.0], [-60.1]]}` — a nested array of dB
//!   values.  The nesting mirrors the console's channel grouping; decoding
//!   flattens it while preserving the received order exactly.  No sorting,
//!   no renumbering.
//!
//! - **Binary**: `{"b": "EGg"}` — **unpadded** standard base64 of a byte
//!   buffer in which each consecutive 2-byte group is a big-endian signed
//!   16-bit integer, scaled by 100.  `value_dB = i16 / 100.0`, so the bytes
//!   `[0x10, 0x68]` (big-endian 4200) decode to `42.00` dB.
//!
//! A corrupt frame is an error for *that frame only*: the caller drops it and
//! the subscription stays alive.

use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use thiserror::Error;
use tracing::trace;

/// Errors from decoding a single metering push body.
#[derive(Debug, Error)]
pub enum MeteringError {
    /// The body is missing the expected value field (`v` for JSON frames,
    /// `b` for binary frames) or the field has the wrong JSON type.
    #[error("metering body has no {field:?} field of the expected type")]
    MissingValue { field: &'static str },

    /// The `b` field is not valid unpadded base64.
    #[error("invalid base64 metering payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded byte buffer is not a whole number of 16-bit samples.
    #[error("binary metering payload of {0} bytes is not divisible into 16-bit samples")]
    OddLength(usize),

    /// The `v` field contains something other than numbers and nested arrays.
    #[error("JSON metering payload contains a non-numeric element")]
    NonNumeric,
}

/// A decoded sample set for one subscription tick.
///
/// `channel_values` is ordered exactly as the channels were subscribed; index
/// `i` is the i-th channel of the originating subscription's `params` list.
#[derive(Debug, Clone, PartialEq)]
pub struct MeteringFrame {
    /// The metering subscription this frame belongs to.
    pub subscription_id: u32,
    /// Per-channel level values in dB, in subscription order.
    pub channel_values: Vec<f64>,
    /// When the client decoded the frame.
    pub received_at: SystemTime,
}

/// Decodes a metering push body into channel-ordered dB values.
///
/// `binary` selects the wire variant and must come from the originating
/// subscription's `binary` flag — the body alone is not self-describing
/// enough to guess safely.
///
/// # Errors
///
/// Any [`MeteringError`] refers to this frame alone; callers are expected to
/// drop the frame and keep the subscription running.
pub fn decode_levels(body: &serde_json::Value, binary: bool) -> Result<Vec<f64>, MeteringError> {
    let values = if binary {
        decode_binary(body)?
    } else {
        decode_json(body)?
    };
    trace!(channels = values.len(), binary, "decoded metering frame");
    Ok(values)
}

/// JSON variant: flatten the nested `v` array, preserving order.
fn decode_json(body: &serde_json::Value) -> Result<Vec<f64>, MeteringError> {
    let nested = body
        .get("v")
        .and_then(serde_json::Value::as_array)
        .ok_or(MeteringError::MissingValue { field: "v" })?;

    let mut values = Vec::new();
    flatten_into(nested, &mut values)?;
    Ok(values)
}

/// Depth-first flatten of a nested number array into `out`.
fn flatten_into(elements: &[serde_json::Value], out: &mut Vec<f64>) -> Result<(), MeteringError> {
    for element in elements {
        match element {
            serde_json::Value::Array(inner) => flatten_into(inner, out)?,
            other => {
                let n = other.as_f64().ok_or(MeteringError::NonNumeric)?;
                out.push(n);
            }
        }
    }
    Ok(())
}

/// Binary variant: unpadded base64 → big-endian i16 pairs → dB.
fn decode_binary(body: &serde_json::Value) -> Result<Vec<f64>, MeteringError> {
    let encoded = body
        .get("b")
        .and_then(serde_json::Value::as_str)
        .ok_or(MeteringError::MissingValue { field: "b" })?;

    let bytes = STANDARD_NO_PAD.decode(encoded)?;
    if bytes.len() % 2 != 0 {
        return Err(MeteringError::OddLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]) as f64 / 100.0)
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

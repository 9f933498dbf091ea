//! Wire protocol layer: envelope codec, well-known paths, metering decoder.
//!
//! Everything in this module is pure and deterministic.  Frames go in,
//! typed values come out (or a typed error); no I/O happens here.

pub mod envelope;
pub mod metering;
pub mod paths;

pub use envelope::{Envelope, EnvelopeError};
pub use metering::{decode_levels, MeteringError, MeteringFrame};
pub use paths::{metering_push_path, parse_metering_push, validate_value_path, PathError};

//! # mixdesk-core
//!
//! Shared library for mixdesk containing the WebSocket wire envelope codec,
//! the real-time metering decoder, and the subscription domain types.
//!
//! This crate is used by the stateful protocol client (`mixdesk-client`) and
//! by anything else that needs to speak the console's wire format.  It has
//! zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! The console control API is REST-over-WebSocket: every frame on the socket
//! is a JSON object `{path, method, body}` (an *envelope*), and a single
//! socket carries request/response calls, value-change pushes, metering
//! streams, and application-state notifications side by side.
//!
//! - **`protocol`** – How frames travel over the socket.  The envelope codec
//!   (`protocol::envelope`), the well-known path table and value-path
//!   validation (`protocol::paths`), and the two metering wire encodings
//!   (`protocol::metering`).
//!
//! - **`domain`** – Pure business types.  The most important piece is
//!   [`SubscriptionSpec`]: a declarative description of a standing
//!   registration (console value, metering session, or app state) from which
//!   the subscribe/unsubscribe envelopes are derived.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mixdesk_core::Envelope` instead of `mixdesk_core::protocol::envelope::Envelope`.
pub use domain::subscription::{SubscriptionSpec, ValueFormat};
pub use protocol::envelope::{Envelope, EnvelopeError};
pub use protocol::metering::{decode_levels, MeteringError, MeteringFrame};
pub use protocol::paths::{validate_value_path, PathError};

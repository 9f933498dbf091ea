//! Application layer for mixdesk-client.
//!
//! The coordination state the supervisor and the façade share:
//!
//! - [`pending`] — the table of in-flight request/response pairs and the
//!   FIFO-per-`(path, method)` correlation discipline.
//! - [`registry`] — the set of standing subscriptions, push routing, and the
//!   replay list used after reconnects.
//! - [`backoff`] — the bounded, jittered reconnect schedule.
//!
//! Nothing in this layer touches the socket; it depends on `domain` and
//! `mixdesk-core` only (plus tokio's sync/time primitives).

pub mod backoff;
pub mod pending;
pub mod registry;

pub use backoff::RecoveryEpisode;
pub use pending::{CallKey, CallResult, PendingRequestTable};
pub use registry::{SubscriptionRegistry, SubscriptionState};

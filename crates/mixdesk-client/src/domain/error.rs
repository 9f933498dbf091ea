//! Error taxonomy for the protocol client.
//!
//! Propagation policy: frame-level problems (a malformed frame, a corrupt
//! metering payload) are recovered locally — logged, dropped, connection kept
//! alive — because one bad frame must never tear down a multiplexed session
//! serving many independent subscribers.  Connection-level failures
//! (`ConnectionLost`, `ReconnectExhausted`) are always surfaced to callers.

use thiserror::Error;

use crate::infrastructure::transport::TransportError;
use mixdesk_core::{EnvelopeError, PathError};

/// Errors surfaced by the public client API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection is not currently `Connected`.  Calls fail fast rather
    /// than queuing indefinitely; re-issue once the lifecycle events report
    /// `Connected` again.
    #[error("not connected to the console")]
    NotConnected,

    /// The caller-supplied timeout elapsed before a reply arrived.  The
    /// pending entry has been removed; a late reply will be logged as
    /// unsolicited and dropped.
    #[error("request timed out before the console replied")]
    Timeout,

    /// The socket dropped while the request was in flight.  The request is
    /// not retried implicitly — whether a re-issue is safe depends on the
    /// endpoint, so that decision belongs to the caller.
    #[error("connection lost before the console replied")]
    ConnectionLost,

    /// A subscription for the same value path + format (or the same metering
    /// id) is already registered.  Unsubscribe first.
    #[error("already subscribed: {0}")]
    AlreadySubscribed(String),

    /// Recovery gave up after hitting `max_attempts` or `max_elapsed`.
    /// The client is in the terminal `Closed` state.
    #[error("reconnect attempts exhausted; client is closed")]
    ReconnectExhausted,

    /// The client was shut down explicitly.  Terminal.
    #[error("client is closed")]
    Closed,

    /// The given subscription handle is not registered (already removed,
    /// or never belonged to this client).
    #[error("unknown subscription handle {0}")]
    UnknownHandle(crate::domain::events::SubscriptionHandle),

    /// A console value path failed the catalog-boundary syntax check.
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    /// An envelope could not be serialized for sending.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The underlying socket failed to connect.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Terminal reasons a pending-request table or registry gets torn down.
///
/// Kept separate from [`ClientError`] so fan-out failure paths can stamp a
/// fresh error per pending entry without requiring the whole error type to
/// be `Clone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The socket dropped; recovery may still succeed.
    ConnectionLost,
    /// Explicit client shutdown.
    Closed,
    /// Recovery bounds exhausted.
    ReconnectExhausted,
}

impl From<FailureKind> for ClientError {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::ConnectionLost => ClientError::ConnectionLost,
            FailureKind::Closed => ClientError::Closed,
            FailureKind::ReconnectExhausted => ClientError::ReconnectExhausted,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

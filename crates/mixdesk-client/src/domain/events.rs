//! Connection lifecycle vocabulary and subscriber-facing update types.

use std::time::SystemTime;

use uuid::Uuid;

use mixdesk_core::MeteringFrame;

/// The connection supervisor's finite state machine.
///
/// ```text
/// Disconnected → Connecting → Connected ⇄ Recovering
///                                  │           │
///                                  └──────► Closed (terminal)
/// ```
///
/// `Closed` is terminal: it is reached by explicit shutdown or by exhausting
/// the reconnect bounds, and no further transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket yet; the client has not attempted to connect.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is up and traffic flows.
    Connected,
    /// The socket dropped unexpectedly; reconnect attempts are running.
    Recovering,
    /// Explicit shutdown or exhausted recovery.  Terminal.
    Closed,
}

/// Lifecycle events emitted on the [`events`] side channel.
///
/// These exist for observability — subscribers use them to distinguish
/// "no new data because nothing changed" from "no new data because we are
/// recovering".  Correctness never depends on consuming them.
///
/// [`events`]: crate::ConsoleClient::events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The socket is up; for reconnects this fires after the connection is
    /// reestablished, before subscription replay begins.
    Connected,
    /// The socket dropped unexpectedly; recovery is starting.
    Disconnected,
    /// A reconnect attempt is about to be made (1-based attempt counter,
    /// reset on every successful connect).
    Reconnecting { attempt: u32 },
    /// Recovery gave up: `max_attempts` or `max_elapsed` was hit.
    Exhausted,
    /// The client shut down; no further events follow.
    Closed,
}

/// Opaque handle identifying one registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One delivery on a subscription's update channel.
#[derive(Debug, Clone)]
pub enum SubscriptionUpdate {
    /// A console value changed.  `path` is the value path the push arrived
    /// on; `body` is the pushed payload in the subscribed format.
    Value {
        path: String,
        body: serde_json::Value,
    },

    /// One decoded metering tick.
    Metering(MeteringFrame),

    /// An application-state notification.
    AppState {
        body: serde_json::Value,
        received_at: SystemTime,
    },

    /// A metering frame arrived but could not be decoded.  The frame was
    /// dropped; the subscription is still active and later frames will be
    /// delivered normally.
    DecodeFailed { detail: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

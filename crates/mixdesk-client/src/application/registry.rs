//! The subscription registry: standing registrations and push routing.
//!
//! Subscriptions are declarative (see [`SubscriptionSpec`]) so that reconnect
//! recovery is a replay of this registry rather than a re-run of caller code.
//! The registry keeps entries in the order they were added — replay preserves
//! that order, which keeps side effects on the console deterministic.
//!
//! # Dispatch discipline
//!
//! Push routing uses `try_send` into each subscription's bounded channel.
//! The socket read loop calls into here, so dispatch must never block: a
//! consumer that stops draining its channel loses its own updates and
//! nothing else.

use std::sync::Mutex;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use mixdesk_core::{decode_levels, validate_value_path, MeteringFrame, SubscriptionSpec};

use crate::domain::error::ClientError;
use crate::domain::events::{SubscriptionHandle, SubscriptionUpdate};

/// Replay state of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered with the console (or about to be, on first subscribe).
    Active,
    /// The connection dropped since the console last saw this registration;
    /// the next successful reconnect must replay it.
    PendingResubscribe,
}

struct Entry {
    handle: SubscriptionHandle,
    spec: SubscriptionSpec,
    state: SubscriptionState,
    tx: mpsc::Sender<SubscriptionUpdate>,
}

/// Tracks active logical subscriptions and routes decoded pushes to them.
pub struct SubscriptionRegistry {
    /// Insertion-ordered; replay order is add order.
    entries: Mutex<Vec<Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Registers a subscription and the channel its updates flow into.
    ///
    /// `state` is [`SubscriptionState::Active`] when the subscribe envelope
    /// goes out immediately, and [`SubscriptionState::PendingResubscribe`]
    /// when the client is mid-recovery and the envelope is deferred to the
    /// next replay.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadySubscribed`] for a duplicate value
    ///   path+format, a duplicate metering id, or a second app-state
    ///   subscription.
    /// - [`ClientError::InvalidPath`] when a value path fails the syntax
    ///   check before anything goes on the wire.
    pub fn add(
        &self,
        spec: SubscriptionSpec,
        tx: mpsc::Sender<SubscriptionUpdate>,
        state: SubscriptionState,
    ) -> Result<SubscriptionHandle, ClientError> {
        if let SubscriptionSpec::Value { path, .. } = &spec {
            validate_value_path(path)?;
        }

        let mut entries = self.entries.lock().expect("registry lock poisoned");
        if let Some(existing) = entries.iter().find(|e| e.spec.conflicts_with(&spec)) {
            return Err(ClientError::AlreadySubscribed(existing.spec.describe()));
        }

        let handle = SubscriptionHandle::new();
        debug!(%handle, spec = %spec.describe(), ?state, "subscription registered");
        entries.push(Entry {
            handle,
            spec,
            state,
            tx,
        });
        Ok(handle)
    }

    /// Removes a registration, returning its spec so the caller can unwind
    /// it server-side.  Returns `None` for an unknown handle.
    ///
    /// Dropping the entry closes its update channel, which is how the
    /// subscriber learns the subscription is gone.
    pub fn remove(&self, handle: SubscriptionHandle) -> Option<SubscriptionSpec> {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        let index = entries.iter().position(|e| e.handle == handle)?;
        let entry = entries.remove(index);
        debug!(%handle, spec = %entry.spec.describe(), "subscription removed");
        Some(entry.spec)
    }

    /// Every registration in original add order, for resubscribe replay and
    /// shutdown unwinding.
    pub fn all(&self) -> Vec<(SubscriptionHandle, SubscriptionSpec)> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries
            .iter()
            .map(|e| (e.handle, e.spec.clone()))
            .collect()
    }

    /// The registrations awaiting replay, in original add order.
    pub fn pending_resubscribe(&self) -> Vec<(SubscriptionHandle, SubscriptionSpec)> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries
            .iter()
            .filter(|e| e.state == SubscriptionState::PendingResubscribe)
            .map(|e| (e.handle, e.spec.clone()))
            .collect()
    }

    /// Marks every registration as needing replay.  Called when the socket
    /// drops.
    pub fn mark_all_pending_resubscribe(&self) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        for entry in entries.iter_mut() {
            entry.state = SubscriptionState::PendingResubscribe;
        }
    }

    /// Marks one registration as needing replay, e.g. when its subscribe
    /// envelope could not be delivered.
    pub fn mark_pending_resubscribe(&self, handle: SubscriptionHandle) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        if let Some(entry) = entries.iter_mut().find(|e| e.handle == handle) {
            entry.state = SubscriptionState::PendingResubscribe;
        }
    }

    /// Marks one registration as successfully replayed.
    pub fn mark_active(&self, handle: SubscriptionHandle) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        if let Some(entry) = entries.iter_mut().find(|e| e.handle == handle) {
            entry.state = SubscriptionState::Active;
        }
    }

    /// Replay state of one registration (test and diagnostic hook).
    pub fn state_of(&self, handle: SubscriptionHandle) -> Option<SubscriptionState> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.iter().find(|e| e.handle == handle).map(|e| e.state)
    }

    /// Routes a console value push to every subscription on `path`.
    ///
    /// Returns `false` when nothing is registered for the path — expected
    /// when an unsubscribe raced a push; the update is dropped silently.
    pub fn route_value(&self, path: &str, body: &serde_json::Value) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        let mut delivered = false;
        for entry in entries.iter() {
            if let SubscriptionSpec::Value { path: sub_path, .. } = &entry.spec {
                if sub_path == path {
                    deliver(
                        entry,
                        SubscriptionUpdate::Value {
                            path: path.to_string(),
                            body: body.clone(),
                        },
                    );
                    delivered = true;
                }
            }
        }
        delivered
    }

    /// Routes a metering push to the subscription with session id `id`,
    /// decoding the body according to that subscription's wire variant.
    ///
    /// A decode failure is delivered as
    /// [`SubscriptionUpdate::DecodeFailed`] and the frame dropped — a
    /// corrupt frame never tears down the session.
    pub fn route_metering(&self, id: u32, body: &serde_json::Value) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        let Some(entry) = entries.iter().find(
            |e| matches!(&e.spec, SubscriptionSpec::Metering { id: sub_id, .. } if *sub_id == id),
        ) else {
            return false;
        };
        let SubscriptionSpec::Metering { binary, .. } = &entry.spec else {
            unreachable!("entry found by metering match");
        };

        let update = match decode_levels(body, *binary) {
            Ok(channel_values) => SubscriptionUpdate::Metering(MeteringFrame {
                subscription_id: id,
                channel_values,
                received_at: SystemTime::now(),
            }),
            Err(e) => {
                warn!(id, error = %e, "dropping undecodable metering frame");
                SubscriptionUpdate::DecodeFailed {
                    detail: e.to_string(),
                }
            }
        };
        deliver(entry, update);
        true
    }

    /// Routes an application-state push to the app-state subscription, if any.
    pub fn route_app_state(&self, body: &serde_json::Value) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        let Some(entry) = entries
            .iter()
            .find(|e| matches!(e.spec, SubscriptionSpec::AppState))
        else {
            return false;
        };
        deliver(
            entry,
            SubscriptionUpdate::AppState {
                body: body.clone(),
                received_at: SystemTime::now(),
            },
        );
        true
    }

    /// Drops every registration (and thereby every update channel).  Used on
    /// shutdown and on reconnect exhaustion.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking delivery into a subscription channel.
fn deliver(entry: &Entry, update: SubscriptionUpdate) {
    match entry.tx.try_send(update) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            // The consumer is not draining its channel; dropping its update
            // keeps the read loop moving for everyone else.
            warn!(handle = %entry.handle, "subscriber lagging; dropping update");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(handle = %entry.handle, "subscriber receiver dropped; update discarded");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mixdesk_core::ValueFormat;
    use serde_json::json;

    fn value_spec(path: &str) -> SubscriptionSpec {
        SubscriptionSpec::value(path, ValueFormat::Plain)
    }

    fn metering_spec(id: u32, binary: bool) -> SubscriptionSpec {
        SubscriptionSpec::Metering {
            id,
            interval_ms: 50,
            binary,
            params: vec![json!({"ch": 1})],
        }
    }

    #[tokio::test]
    async fn test_add_and_route_value_update() {
        // Arrange
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.add(value_spec("/ch/1/mix/fader"), tx, SubscriptionState::Active).unwrap();

        // Act
        let delivered = registry.route_value("/ch/1/mix/fader", &json!(-10.5));

        // Assert
        assert!(delivered);
        match rx.recv().await.unwrap() {
            SubscriptionUpdate::Value { path, body } => {
                assert_eq!(path, "/ch/1/mix/fader");
                assert_eq!(body, json!(-10.5));
            }
            other => panic!("expected Value update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_value_subscription_is_rejected() {
        let registry = SubscriptionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        registry.add(value_spec("/ch/1/mix/fader"), tx1, SubscriptionState::Active).unwrap();

        let result = registry.add(value_spec("/ch/1/mix/fader"), tx2, SubscriptionState::Active);

        assert!(matches!(result, Err(ClientError::AlreadySubscribed(_))));
    }

    #[tokio::test]
    async fn test_same_path_different_format_is_allowed() {
        let registry = SubscriptionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        registry
            .add(
                SubscriptionSpec::value("/ch/1/mix/fader", ValueFormat::Plain),
                tx1,
                SubscriptionState::Active,
            )
            .unwrap();
        registry
            .add(
                SubscriptionSpec::value("/ch/1/mix/fader", ValueFormat::Norm),
                tx2,
                SubscriptionState::Active,
            )
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_value_path_is_rejected_at_registration() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let result = registry.add(value_spec("ch/1/mix/fader"), tx, SubscriptionState::Active);
        assert!(matches!(result, Err(ClientError::InvalidPath(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_all_preserves_add_order() {
        // Arrange: add in a known order.
        let registry = SubscriptionRegistry::new();
        let specs = [
            value_spec("/ch/1/mix/fader"),
            metering_spec(7, true),
            SubscriptionSpec::AppState,
            value_spec("/ch/2/mix/fader"),
        ];
        for spec in &specs {
            let (tx, _rx) = mpsc::channel(8);
            // Leak the receiver; routing is not under test here.
            std::mem::forget(_rx);
            registry.add(spec.clone(), tx, SubscriptionState::Active).unwrap();
        }

        // Act / Assert: replay order is add order.
        let replayed: Vec<SubscriptionSpec> =
            registry.all().into_iter().map(|(_, s)| s).collect();
        assert_eq!(replayed, specs);
    }

    #[tokio::test]
    async fn test_remove_returns_spec_and_closes_channel() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = registry.add(metering_spec(3, false), tx, SubscriptionState::Active).unwrap();

        let spec = registry.remove(handle).unwrap();

        assert!(matches!(spec, SubscriptionSpec::Metering { id: 3, .. }));
        // Sender dropped with the entry → receiver sees end of stream.
        assert!(rx.recv().await.is_none());
        // Second remove is a no-op.
        assert!(registry.remove(handle).is_none());
    }

    #[tokio::test]
    async fn test_route_to_unknown_path_is_dropped_silently() {
        // The unsubscribed-just-before-a-push race: not an error.
        let registry = SubscriptionRegistry::new();
        assert!(!registry.route_value("/ch/9/mix/fader", &json!(0)));
        assert!(!registry.route_metering(99, &json!({"v": [[0.0]]})));
        assert!(!registry.route_app_state(&json!({"scene": 4})));
    }

    #[tokio::test]
    async fn test_route_metering_decodes_binary_frames() {
        // Arrange: binary-mode subscription id 7.
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.add(metering_spec(7, true), tx, SubscriptionState::Active).unwrap();

        // Act: push "EGg" = bytes [0x10, 0x68] = big-endian 4200.
        registry.route_metering(7, &json!({"b": "EGg"}));

        // Assert
        match rx.recv().await.unwrap() {
            SubscriptionUpdate::Metering(frame) => {
                assert_eq!(frame.subscription_id, 7);
                assert_eq!(frame.channel_values, vec![42.0]);
            }
            other => panic!("expected Metering update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_metering_json_mode_preserves_order() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.add(metering_spec(2, false), tx, SubscriptionState::Active).unwrap();

        registry.route_metering(2, &json!({"v": [[3.0, 1.0, 2.0]]}));

        match rx.recv().await.unwrap() {
            SubscriptionUpdate::Metering(frame) => {
                assert_eq!(frame.channel_values, vec![3.0, 1.0, 2.0]);
            }
            other => panic!("expected Metering update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_corrupt_metering_frame_keeps_subscription_alive() {
        // Arrange
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.add(metering_spec(7, true), tx, SubscriptionState::Active).unwrap();

        // Act: a corrupt frame, then a good one.
        registry.route_metering(7, &json!({"b": "!!!"}));
        registry.route_metering(7, &json!({"b": "EGg"}));

        // Assert: the corrupt frame surfaces as DecodeFailed, the good frame
        // still arrives.
        assert!(matches!(
            rx.recv().await.unwrap(),
            SubscriptionUpdate::DecodeFailed { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SubscriptionUpdate::Metering(_)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_full_subscriber_channel_drops_update_without_blocking() {
        // Arrange: capacity-1 channel, already full.
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.add(value_spec("/ch/1/mix/fader"), tx, SubscriptionState::Active).unwrap();
        registry.route_value("/ch/1/mix/fader", &json!(1));

        // Act: this update has nowhere to go and must be dropped, not block.
        registry.route_value("/ch/1/mix/fader", &json!(2));

        // Assert: only the first update was delivered.
        assert!(matches!(
            rx.recv().await.unwrap(),
            SubscriptionUpdate::Value { body, .. } if body == json!(1)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resubscribe_state_tracking() {
        // Arrange
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let handle = registry.add(value_spec("/ch/1/mix/fader"), tx, SubscriptionState::Active).unwrap();
        assert_eq!(registry.state_of(handle), Some(SubscriptionState::Active));

        // Act / Assert: disconnect marks everything pending...
        registry.mark_all_pending_resubscribe();
        assert_eq!(
            registry.state_of(handle),
            Some(SubscriptionState::PendingResubscribe)
        );
        // ...and the replay list now contains it.
        assert_eq!(registry.pending_resubscribe().len(), 1);

        // ...and replay success marks it active again.
        registry.mark_active(handle);
        assert_eq!(registry.state_of(handle), Some(SubscriptionState::Active));
    }
}

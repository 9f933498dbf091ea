//! The pending-request table: in-flight calls awaiting correlation.
//!
//! The wire protocol has no request id, so a reply can only be matched to its
//! request by `(path, method)` — and when several identical calls are
//! outstanding at once, by FIFO issue order within that key.  The table keeps
//! one queue per `(path, method)` pair plus a per-queue sequence counter that
//! disambiguates entries for cancellation.
//!
//! Every entry is resolved exactly once, through exactly one of:
//!
//! - [`resolve`](PendingRequestTable::resolve) — a matching reply arrived,
//! - [`cancel`](PendingRequestTable::cancel) — the caller's timeout fired,
//! - [`expire_overdue`](PendingRequestTable::expire_overdue) — the sweep
//!   found the entry past its deadline,
//! - [`fail_all`](PendingRequestTable::fail_all) — the connection dropped.
//!
//! This is what guarantees no caller ever blocks forever across a reconnect.
//!
//! All access goes through one internal mutex; no lock is held across await
//! points (no operation here awaits at all).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::error::{ClientError, FailureKind};

/// What a completed call yields: the reply body, or why there will never be one.
pub type CallResult = Result<serde_json::Value, ClientError>;

/// Identity of one in-flight call, used to cancel it on caller timeout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    path: String,
    method: String,
    seq: u64,
}

struct PendingEntry {
    seq: u64,
    deadline: Instant,
    tx: oneshot::Sender<CallResult>,
}

/// One FIFO queue of outstanding calls sharing a `(path, method)` key.
#[derive(Default)]
struct KeyQueue {
    /// Sequence counter scoped to this key; only disambiguates entries that
    /// are outstanding concurrently, so resetting when the queue empties is
    /// harmless.
    next_seq: u64,
    entries: VecDeque<PendingEntry>,
}

struct Inner {
    queues: HashMap<(String, String), KeyQueue>,
    /// Once set, the table refuses new registrations with this reason.
    closed: Option<FailureKind>,
}

/// Tracks in-flight request/response pairs awaiting correlation.
///
/// The table owns the fulfillment side of every pending call; callers hold
/// only the receiving future.
pub struct PendingRequestTable {
    inner: Mutex<Inner>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queues: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Registers a new in-flight call and returns its key plus the future
    /// the caller awaits.
    ///
    /// # Errors
    ///
    /// Fails with the table's close reason (`Closed` or `ReconnectExhausted`)
    /// once the connection has permanently shut down.
    pub fn register(
        &self,
        path: &str,
        method: &str,
        deadline: Instant,
    ) -> Result<(CallKey, oneshot::Receiver<CallResult>), ClientError> {
        let mut inner = self.inner.lock().expect("pending table lock poisoned");
        if let Some(reason) = inner.closed {
            return Err(reason.into());
        }

        let queue = inner
            .queues
            .entry((path.to_string(), method.to_string()))
            .or_default();
        let seq = queue.next_seq;
        queue.next_seq += 1;

        let (tx, rx) = oneshot::channel();
        queue.entries.push_back(PendingEntry { seq, deadline, tx });

        let key = CallKey {
            path: path.to_string(),
            method: method.to_string(),
            seq,
        };
        Ok((key, rx))
    }

    /// Fulfills the **oldest** pending entry for `(path, method)` with the
    /// reply body.
    ///
    /// Returns `false` when no entry exists for the key — the frame is then
    /// a push (or an unsolicited reply) and the caller routes it onward,
    /// which is why the body is borrowed rather than consumed.
    pub fn resolve(&self, path: &str, method: &str, body: &serde_json::Value) -> bool {
        let entry = {
            let mut inner = self.inner.lock().expect("pending table lock poisoned");
            match inner.queues.get_mut(&(path.to_string(), method.to_string())) {
                Some(queue) => {
                    let entry = queue.entries.pop_front();
                    if queue.entries.is_empty() {
                        inner.queues.remove(&(path.to_string(), method.to_string()));
                    }
                    entry
                }
                None => None,
            }
        };

        match entry {
            Some(entry) => {
                // A dropped receiver means the caller gave up (timed out and
                // cancelled between our pop and this send); nothing to do.
                if entry.tx.send(Ok(body.clone())).is_err() {
                    debug!(path, method, "reply arrived after caller gave up");
                }
                true
            }
            None => false,
        }
    }

    /// Removes one specific entry, releasing its slot in the FIFO queue.
    ///
    /// Called from the caller-side timeout path so a late reply is not
    /// matched against a future the caller has abandoned.
    pub fn cancel(&self, key: &CallKey) -> bool {
        let mut inner = self.inner.lock().expect("pending table lock poisoned");
        let map_key = (key.path.clone(), key.method.clone());
        if let Some(queue) = inner.queues.get_mut(&map_key) {
            let before = queue.entries.len();
            queue.entries.retain(|entry| entry.seq != key.seq);
            let removed = queue.entries.len() < before;
            if queue.entries.is_empty() {
                inner.queues.remove(&map_key);
            }
            removed
        } else {
            false
        }
    }

    /// Fails every pending entry with `kind` and clears the table.
    ///
    /// Called by the connection supervisor the moment the socket drops; a
    /// call issued before the drop is never silently retried, so its caller
    /// must learn about the loss immediately.
    pub fn fail_all(&self, kind: FailureKind) {
        let drained: Vec<PendingEntry> = {
            let mut inner = self.inner.lock().expect("pending table lock poisoned");
            inner
                .queues
                .drain()
                .flat_map(|(_, queue)| queue.entries)
                .collect()
        };

        if !drained.is_empty() {
            warn!(count = drained.len(), ?kind, "failing all pending calls");
        }
        for entry in drained {
            let _ = entry.tx.send(Err(ClientError::from(kind)));
        }
    }

    /// Fails everything and permanently closes the table; subsequent
    /// [`register`](Self::register) calls report `kind`.
    pub fn close(&self, kind: FailureKind) {
        {
            let mut inner = self.inner.lock().expect("pending table lock poisoned");
            inner.closed = Some(kind);
        }
        self.fail_all(kind);
    }

    /// Fails every entry whose deadline has passed with `Timeout`.
    ///
    /// Invoked periodically by the supervisor; covers entries whose caller
    /// dropped the future without cancelling.
    pub fn expire_overdue(&self, now: Instant) {
        let expired: Vec<PendingEntry> = {
            let mut inner = self.inner.lock().expect("pending table lock poisoned");
            let mut expired = Vec::new();
            inner.queues.retain(|_, queue| {
                // Entries are FIFO per key but deadlines need not be ordered
                // (callers pick their own timeouts), so scan the whole queue.
                let mut remaining = VecDeque::with_capacity(queue.entries.len());
                for entry in queue.entries.drain(..) {
                    if entry.deadline <= now {
                        expired.push(entry);
                    } else {
                        remaining.push_back(entry);
                    }
                }
                queue.entries = remaining;
                !queue.entries.is_empty()
            });
            expired
        };

        for entry in expired {
            debug!(seq = entry.seq, "expiring overdue call");
            let _ = entry.tx.send(Err(ClientError::Timeout));
        }
    }

    /// Why the table was closed, if it has been.
    ///
    /// Lets the façade report `Closed` vs `ReconnectExhausted` accurately to
    /// callers that arrive after the terminal transition.
    pub fn close_reason(&self) -> Option<FailureKind> {
        self.inner.lock().expect("pending table lock poisoned").closed
    }

    /// Number of in-flight entries across all keys.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("pending table lock poisoned");
        inner.queues.values().map(|q| q.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_register_then_resolve_fulfills_future() {
        // Arrange
        let table = PendingRequestTable::new();
        let (_key, rx) = table.register("/app/connect", "POST", far_deadline()).unwrap();
        let mut fut = task::spawn(rx);

        // The future must not resolve before a reply arrives.
        assert_pending!(fut.poll());

        // Act
        let matched = table.resolve("/app/connect", "POST", &serde_json::json!({"ok": true}));

        // Assert
        assert!(matched);
        let result = assert_ready!(fut.poll()).unwrap();
        assert_eq!(result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_replies_match_in_fifo_order_per_key() {
        // Arrange: two concurrent identical calls.
        let table = PendingRequestTable::new();
        let (_k1, rx1) = table.register("/app/connect", "POST", far_deadline()).unwrap();
        let (_k2, rx2) = table.register("/app/connect", "POST", far_deadline()).unwrap();

        // Act: server replies to the first request, then the second.
        table.resolve("/app/connect", "POST", &serde_json::json!("first"));
        table.resolve("/app/connect", "POST", &serde_json::json!("second"));

        // Assert: issue order, not reply-arrival coincidence.
        assert_eq!(rx1.await.unwrap().unwrap(), "first");
        assert_eq!(rx2.await.unwrap().unwrap(), "second");
    }

    #[tokio::test]
    async fn test_fifo_is_scoped_per_path_method_key() {
        // Arrange: interleave two different keys.
        let table = PendingRequestTable::new();
        let (_a, rx_a) = table.register("/a", "GET", far_deadline()).unwrap();
        let (_b, rx_b) = table.register("/b", "GET", far_deadline()).unwrap();

        // Act: resolve in the opposite order of registration.
        table.resolve("/b", "GET", &serde_json::json!("b"));
        table.resolve("/a", "GET", &serde_json::json!("a"));

        // Assert: keys do not interfere with each other.
        assert_eq!(rx_a.await.unwrap().unwrap(), "a");
        assert_eq!(rx_b.await.unwrap().unwrap(), "b");
    }

    #[tokio::test]
    async fn test_resolve_without_pending_entry_returns_false() {
        let table = PendingRequestTable::new();
        assert!(!table.resolve("/ch/1/mix/fader", "POST", &serde_json::json!(0.5)));
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_future_exactly_once() {
        // Arrange: three pending calls across two keys.
        let table = PendingRequestTable::new();
        let (_k1, rx1) = table.register("/a", "GET", far_deadline()).unwrap();
        let (_k2, rx2) = table.register("/a", "GET", far_deadline()).unwrap();
        let (_k3, rx3) = table.register("/b", "POST", far_deadline()).unwrap();

        // Act
        table.fail_all(FailureKind::ConnectionLost);

        // Assert: every future resolved with ConnectionLost, table empty.
        for rx in [rx1, rx2, rx3] {
            assert!(matches!(
                rx.await.unwrap(),
                Err(ClientError::ConnectionLost)
            ));
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_register_after_close_reports_close_reason() {
        // Arrange
        let table = PendingRequestTable::new();
        table.close(FailureKind::Closed);

        // Act / Assert
        assert!(matches!(
            table.register("/a", "GET", far_deadline()),
            Err(ClientError::Closed)
        ));

        // Exhaustion closes with a different reason.
        let table = PendingRequestTable::new();
        table.close(FailureKind::ReconnectExhausted);
        assert!(matches!(
            table.register("/a", "GET", far_deadline()),
            Err(ClientError::ReconnectExhausted)
        ));
    }

    #[tokio::test]
    async fn test_cancel_removes_only_the_given_entry() {
        // Arrange
        let table = PendingRequestTable::new();
        let (k1, rx1) = table.register("/a", "GET", far_deadline()).unwrap();
        let (_k2, rx2) = table.register("/a", "GET", far_deadline()).unwrap();

        // Act: cancel the first call (its caller timed out).
        assert!(table.cancel(&k1));
        drop(rx1);

        // Assert: the next reply goes to the second call, not the hole left
        // by the first.
        table.resolve("/a", "GET", &serde_json::json!("reply"));
        assert_eq!(rx2.await.unwrap().unwrap(), "reply");

        // Cancelling again is a no-op.
        assert!(!table.cancel(&k1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_overdue_fails_only_past_deadline_entries() {
        // Arrange: one entry due in 1s, one in 60s.
        let table = PendingRequestTable::new();
        let (_k1, rx1) = table
            .register("/a", "GET", Instant::now() + Duration::from_secs(1))
            .unwrap();
        let (_k2, rx2) = table
            .register("/a", "GET", Instant::now() + Duration::from_secs(60))
            .unwrap();

        // Act: advance past the first deadline and sweep.
        tokio::time::advance(Duration::from_secs(2)).await;
        table.expire_overdue(Instant::now());

        // Assert
        assert!(matches!(rx1.await.unwrap(), Err(ClientError::Timeout)));
        assert_eq!(table.len(), 1);

        // The survivor still resolves normally.
        table.resolve("/a", "GET", &serde_json::json!(1));
        assert!(rx2.await.unwrap().is_ok());
    }
}

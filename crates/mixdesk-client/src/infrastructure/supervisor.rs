//! The connection supervisor: single owner of the physical socket.
//!
//! The supervisor task runs the whole socket lifecycle.  While connected it
//! is the one reader of the stream and the one writer of the sink (callers
//! hand frames to a queue; the supervisor drains it, so frames are never
//! interleaved mid-write).  On an unexpected close it fails every pending
//! call, marks all subscriptions for replay, and runs the bounded backoff
//! schedule; after a successful reconnect it replays the subscription
//! registry sequentially before normal traffic resumes alongside it.
//!
//! No other component holds a socket reference.  The façade reaches the
//! socket only through the outbound queue and the command channel.
//!
//! ```text
//!        ┌──────────────── Supervisor task ────────────────┐
//! out_tx │ out_rx ──► sink.send (serialized)               │
//! cmd_tx │ cmd_rx ──► shutdown                             │
//!        │ stream.next_frame ──► dispatch ──► pending      │
//!        │                                └─► registry     │
//!        │ sweep tick ──► pending.expire_overdue           │
//!        └─────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use mixdesk_core::protocol::paths;
use mixdesk_core::Envelope;

use crate::application::backoff::RecoveryEpisode;
use crate::application::pending::PendingRequestTable;
use crate::application::registry::SubscriptionRegistry;
use crate::domain::config::ClientConfig;
use crate::domain::error::{ClientError, FailureKind};
use crate::domain::events::{ConnectionEvent, ConnectionState};
use crate::infrastructure::transport::{Connector, FrameSink, FrameStream};

/// The two tables every component coordinates through.  The supervisor and
/// the façade share one instance behind an `Arc`.
pub(crate) struct Shared {
    pub pending: PendingRequestTable,
    pub registry: SubscriptionRegistry,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            pending: PendingRequestTable::new(),
            registry: SubscriptionRegistry::new(),
        }
    }
}

/// Control messages from the façade to the supervisor task.
pub(crate) enum Command {
    /// Tear everything down; `done` fires once the terminal state is reached.
    Shutdown { done: oneshot::Sender<()> },
}

type Link = (Box<dyn FrameSink>, Box<dyn FrameStream>);

/// How a connected session ended.
enum SessionEnd {
    /// The socket dropped out from under us.
    ConnectionLost,
    /// Shutdown was requested (the ack sender is absent when the façade was
    /// simply dropped).
    Shutdown(Option<oneshot::Sender<()>>),
}

/// How a recovery episode ended.
enum RecoverOutcome {
    Reconnected(Link),
    Exhausted,
    Shutdown(Option<oneshot::Sender<()>>),
}

pub(crate) struct Supervisor {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    /// Kept so the resubscribe replay can enqueue frames like any caller.
    out_tx: mpsc::Sender<String>,
    out_rx: mpsc::Receiver<String>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        shared: Arc<Shared>,
        state_tx: watch::Sender<ConnectionState>,
        events_tx: broadcast::Sender<ConnectionEvent>,
        out_tx: mpsc::Sender<String>,
        out_rx: mpsc::Receiver<String>,
        cmd_rx: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            config,
            connector,
            shared,
            state_tx,
            events_tx,
            out_tx,
            out_rx,
            cmd_rx,
        }
    }

    /// Runs until shutdown or reconnect exhaustion.  `link` is the socket
    /// the façade established during [`ConsoleClient::connect`].
    ///
    /// [`ConsoleClient::connect`]: crate::ConsoleClient::connect
    pub(crate) async fn run(mut self, mut link: Link) {
        loop {
            self.state_tx.send_replace(ConnectionState::Connected);
            let _ = self.events_tx.send(ConnectionEvent::Connected);

            match self.run_connected(link).await {
                SessionEnd::Shutdown(done) => {
                    self.finish_closed(FailureKind::Closed, ConnectionEvent::Closed);
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    return;
                }
                SessionEnd::ConnectionLost => {}
            }

            // Fan out the loss immediately: no caller may block across a
            // reconnect, and frames queued for the dead socket are stale.
            self.shared.pending.fail_all(FailureKind::ConnectionLost);
            self.shared.registry.mark_all_pending_resubscribe();
            while self.out_rx.try_recv().is_ok() {}

            self.state_tx.send_replace(ConnectionState::Recovering);
            let _ = self.events_tx.send(ConnectionEvent::Disconnected);

            match self.recover().await {
                RecoverOutcome::Reconnected(new_link) => link = new_link,
                RecoverOutcome::Shutdown(done) => {
                    self.finish_closed(FailureKind::Closed, ConnectionEvent::Closed);
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    return;
                }
                RecoverOutcome::Exhausted => {
                    self.finish_closed(FailureKind::ReconnectExhausted, ConnectionEvent::Exhausted);
                    return;
                }
            }
        }
    }

    /// One connected session: read loop, write drain, expiry sweep, and the
    /// resubscribe replay all multiplexed here, which is what makes this the
    /// single reader and the single writer.
    async fn run_connected(&mut self, link: Link) -> SessionEnd {
        let (mut sink, mut stream) = link;

        let mut sweep = interval(self.config.expiry_sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let replay = replay_subscriptions(
            Arc::clone(&self.shared),
            self.out_tx.clone(),
            self.config.call_timeout,
        );
        tokio::pin!(replay);
        let mut replay_done = false;

        loop {
            tokio::select! {
                _ = &mut replay, if !replay_done => {
                    replay_done = true;
                }

                outbound = self.out_rx.recv() => {
                    let Some(frame) = outbound else {
                        // Every sender is gone, façade included.
                        return SessionEnd::Shutdown(None);
                    };
                    if let Err(e) = sink.send(frame).await {
                        warn!(error = %e, "socket write failed");
                        return SessionEnd::ConnectionLost;
                    }
                }

                inbound = stream.next_frame() => {
                    match inbound {
                        Some(Ok(frame)) => dispatch(&self.shared, &frame),
                        Some(Err(e)) => {
                            warn!(error = %e, "socket read failed");
                            return SessionEnd::ConnectionLost;
                        }
                        None => {
                            info!("socket closed by console");
                            return SessionEnd::ConnectionLost;
                        }
                    }
                }

                _ = sweep.tick() => {
                    self.shared.pending.expire_overdue(Instant::now());
                }

                command = self.cmd_rx.recv() => {
                    match command {
                        Some(Command::Shutdown { done }) => {
                            unwind_server_side(&self.shared, sink.as_mut()).await;
                            let _ = sink.close().await;
                            return SessionEnd::Shutdown(Some(done));
                        }
                        None => {
                            // Façade dropped without calling shutdown.
                            let _ = sink.close().await;
                            return SessionEnd::Shutdown(None);
                        }
                    }
                }
            }
        }
    }

    /// Runs the backoff schedule until a connect succeeds or a bound is hit.
    async fn recover(&mut self) -> RecoverOutcome {
        let mut episode = RecoveryEpisode::start(self.config.reconnect.clone(), Instant::now());

        loop {
            let Some((attempt, delay)) = episode.next_attempt(Instant::now()) else {
                warn!(attempts = episode.attempts(), "reconnect bounds exhausted");
                return RecoverOutcome::Exhausted;
            };
            let _ = self.events_tx.send(ConnectionEvent::Reconnecting { attempt });
            debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect attempt scheduled");

            tokio::select! {
                _ = sleep(delay) => {}
                command = self.cmd_rx.recv() => {
                    return match command {
                        Some(Command::Shutdown { done }) => RecoverOutcome::Shutdown(Some(done)),
                        None => RecoverOutcome::Shutdown(None),
                    };
                }
            }

            self.state_tx.send_replace(ConnectionState::Connecting);
            match self.connector.connect(&self.config.url).await {
                Ok(link) => {
                    info!(attempt, "reconnected to console");
                    return RecoverOutcome::Reconnected(link);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                    self.state_tx.send_replace(ConnectionState::Recovering);
                }
            }
        }
    }

    /// Terminal transition shared by shutdown and exhaustion.
    fn finish_closed(&self, kind: FailureKind, event: ConnectionEvent) {
        self.shared.pending.close(kind);
        self.shared.registry.clear();
        self.state_tx.send_replace(ConnectionState::Closed);
        let _ = self.events_tx.send(event);
    }
}

/// Routes one inbound frame: reply candidates against the pending table
/// first, pushes to the registry only when no pending call matched.  This
/// ordering is what disambiguates a reply from a push sharing its path.
fn dispatch(shared: &Shared, frame: &str) {
    let envelope = match Envelope::decode(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            // One bad frame never ends a session serving many subscribers.
            warn!(error = %e, "dropping malformed frame");
            return;
        }
    };

    if shared
        .pending
        .resolve(&envelope.path, &envelope.method, &envelope.body)
    {
        return;
    }

    let routed = if let Some(id) = paths::parse_metering_push(&envelope.path) {
        shared.registry.route_metering(id, &envelope.body)
    } else if envelope.path == paths::APP_STATE_PATH {
        shared.registry.route_app_state(&envelope.body)
    } else {
        shared.registry.route_value(&envelope.path, &envelope.body)
    };

    if !routed {
        // Either an unsolicited reply or a push that raced an unsubscribe;
        // both are dropped.
        debug!(path = %envelope.path, method = %envelope.method, "frame matched nothing; dropped");
    }
}

/// Registers a call in the pending table, enqueues its envelope, and awaits
/// the reply or the timeout.  Used by the façade for `call`/`subscribe` and
/// by the resubscribe replay.
pub(crate) async fn issue_call(
    shared: &Shared,
    out_tx: &mpsc::Sender<String>,
    envelope: Envelope,
    timeout: Duration,
) -> Result<serde_json::Value, ClientError> {
    let deadline = Instant::now() + timeout;
    let (key, rx) = shared
        .pending
        .register(&envelope.path, &envelope.method, deadline)?;

    let frame = envelope.encode()?;
    if out_tx.send(frame).await.is_err() {
        shared.pending.cancel(&key);
        return Err(ClientError::NotConnected);
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        // The fulfillment side vanished without sending — table torn down.
        Ok(Err(_)) => Err(ClientError::ConnectionLost),
        Err(_elapsed) => {
            // Remove the entry so a late reply is not matched to a caller
            // that already gave up.
            shared.pending.cancel(&key);
            Err(ClientError::Timeout)
        }
    }
}

/// Replays every subscription awaiting resubscribe, in original add order,
/// awaiting each reply before sending the next so a reconnect never bursts
/// the console with the whole registry at once.
async fn replay_subscriptions(shared: Arc<Shared>, out_tx: mpsc::Sender<String>, timeout: Duration) {
    let pending = shared.registry.pending_resubscribe();
    if pending.is_empty() {
        return;
    }
    info!(count = pending.len(), "replaying subscriptions");

    for (handle, spec) in pending {
        match issue_call(&shared, &out_tx, spec.subscribe_envelope(), timeout).await {
            Ok(_) => {
                debug!(spec = %spec.describe(), "resubscribed");
                shared.registry.mark_active(handle);
            }
            Err(ClientError::Timeout) => {
                // Leave it pending; the next reconnect tries again.
                warn!(spec = %spec.describe(), "resubscribe timed out");
            }
            Err(e) => {
                warn!(spec = %spec.describe(), error = %e, "resubscribe replay aborted");
                return;
            }
        }
    }
}

/// Best-effort server-side unwind during shutdown: send an unsubscribe for
/// every registration while the socket is still up.
async fn unwind_server_side(shared: &Shared, sink: &mut dyn FrameSink) {
    for (_, spec) in shared.registry.all() {
        match spec.unsubscribe_envelope().encode() {
            Ok(frame) => {
                if let Err(e) = sink.send(frame).await {
                    debug!(error = %e, "unsubscribe send failed during shutdown");
                    return;
                }
            }
            Err(e) => warn!(error = %e, "could not encode unsubscribe envelope"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

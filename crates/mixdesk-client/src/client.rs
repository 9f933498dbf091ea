//! The public façade: `ConsoleClient`.
//!
//! Composes the pending-request table, the subscription registry, and the
//! connection supervisor behind the four-operation surface the rest of an
//! application uses: `call`, `subscribe`/`unsubscribe`, and the `events`
//! side channel.  The client is cheap to share: every method takes `&self`
//! and the heavy lifting happens in the supervisor task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};

use mixdesk_core::{Envelope, SubscriptionSpec};

use crate::domain::config::ClientConfig;
use crate::domain::error::ClientError;
use crate::domain::events::{
    ConnectionEvent, ConnectionState, SubscriptionHandle, SubscriptionUpdate,
};
use crate::application::registry::SubscriptionState;
use crate::infrastructure::supervisor::{issue_call, Command, Shared, Supervisor};
use crate::infrastructure::transport::{Connector, TungsteniteConnector};

/// A connected protocol client for one console.
///
/// Dropping the client tears the connection down; prefer
/// [`shutdown`](Self::shutdown) for a graceful exit that unsubscribes
/// server-side first.
pub struct ConsoleClient {
    shared: Arc<Shared>,
    out_tx: mpsc::Sender<String>,
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    call_timeout: Duration,
    subscription_buffer: usize,
}

impl ConsoleClient {
    /// Connects to the console at `config.url` over a real WebSocket.
    ///
    /// The initial connect is not retried: if the console is unreachable the
    /// caller finds out here.  Reconnect-with-backoff only guards
    /// connections that were once established.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the connection cannot be
    /// established.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        Self::connect_with(config, Arc::new(TungsteniteConnector)).await
    }

    /// Connects through a caller-supplied [`Connector`].
    ///
    /// This is the seam the integration tests use to drive the full client
    /// against an in-process mock console.
    pub async fn connect_with(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ClientError> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _initial_rx) = broadcast::channel(config.event_buffer.max(1));

        state_tx.send_replace(ConnectionState::Connecting);
        let link = connector.connect(&config.url).await?;
        // Mark connected before the supervisor task gets a chance to run, so
        // a call issued immediately after connect() is not rejected.
        state_tx.send_replace(ConnectionState::Connected);

        let shared = Arc::new(Shared::new());
        let (out_tx, out_rx) = mpsc::channel(config.outbound_queue.max(1));
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        let call_timeout = config.call_timeout;
        let subscription_buffer = config.subscription_buffer.max(1);

        let supervisor = Supervisor::new(
            config,
            connector,
            Arc::clone(&shared),
            state_tx,
            events_tx.clone(),
            out_tx.clone(),
            out_rx,
            cmd_rx,
        );
        tokio::spawn(supervisor.run(link));

        Ok(Self {
            shared,
            out_tx,
            cmd_tx,
            state_rx,
            events_tx,
            call_timeout,
            subscription_buffer,
        })
    }

    /// Issues one request and awaits its reply.
    ///
    /// Correlation is FIFO per `(path, method)`: concurrent identical calls
    /// receive their replies in issue order.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] — the connection is down or
    ///   recovering; nothing was sent.  Calls never queue across an outage.
    /// - [`ClientError::Timeout`] — `timeout` elapsed; the pending entry was
    ///   removed.
    /// - [`ClientError::ConnectionLost`] — the socket dropped mid-flight.
    ///   The call is *not* retried implicitly; re-issue if the endpoint is
    ///   safe to repeat.
    /// - [`ClientError::Closed`] / [`ClientError::ReconnectExhausted`] — the
    ///   client is terminally closed.
    pub async fn call(
        &self,
        path: &str,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ClientError> {
        self.ensure_connected()?;
        issue_call(
            &self.shared,
            &self.out_tx,
            Envelope::new(path, method, body),
            timeout,
        )
        .await
    }

    /// Registers a subscription and returns its handle plus the channel the
    /// updates arrive on.
    ///
    /// When the client is recovering, the registration is accepted and the
    /// subscribe envelope is deferred until the reconnect replay; updates
    /// start once the console has acknowledged it.
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadySubscribed`] for a duplicate registration,
    /// [`ClientError::InvalidPath`] for a syntactically invalid value path,
    /// and the terminal errors once the client is closed.
    pub async fn subscribe(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<SubscriptionUpdate>), ClientError> {
        let state = *self.state_rx.borrow();
        if state == ConnectionState::Closed {
            return Err(self.terminal_error());
        }

        let connected = state == ConnectionState::Connected;
        let initial = if connected {
            SubscriptionState::Active
        } else {
            SubscriptionState::PendingResubscribe
        };

        let (tx, rx) = mpsc::channel(self.subscription_buffer);
        let handle = self.shared.registry.add(spec.clone(), tx, initial)?;

        if connected {
            let result = issue_call(
                &self.shared,
                &self.out_tx,
                spec.subscribe_envelope(),
                self.call_timeout,
            )
            .await;
            if let Err(e) = result {
                // Keep the registration; the next successful reconnect (or
                // replay) will register it with the console.
                warn!(spec = %spec.describe(), error = %e, "subscribe not acknowledged; deferred to replay");
                self.shared.registry.mark_pending_resubscribe(handle);
            }
        }

        Ok((handle, rx))
    }

    /// Removes a subscription.
    ///
    /// The local registration goes away immediately (its update channel
    /// closes); if the connection is up, the console-side registration is
    /// unwound best-effort.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownHandle`] when the handle was already removed.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), ClientError> {
        let spec = self
            .shared
            .registry
            .remove(handle)
            .ok_or(ClientError::UnknownHandle(handle))?;

        if *self.state_rx.borrow() == ConnectionState::Connected {
            let result = issue_call(
                &self.shared,
                &self.out_tx,
                spec.unsubscribe_envelope(),
                self.call_timeout,
            )
            .await;
            if let Err(e) = result {
                debug!(spec = %spec.describe(), error = %e, "server-side unsubscribe failed (already removed locally)");
            }
        }
        Ok(())
    }

    /// A fresh receiver for the lifecycle event stream.
    ///
    /// Purely observational: nothing in the client requires anyone to
    /// consume these.  A lagging receiver skips old events rather than
    /// applying backpressure.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }

    /// A watch on the connection state machine.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Current connection state snapshot.
    pub fn current_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Gracefully shuts the client down: unsubscribes everything server-side
    /// while the socket is still up, fails all pending calls with `Closed`,
    /// and parks the state machine in terminal `Closed`.  Idempotent.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Shutdown { done: done_tx })
            .await
            .is_err()
        {
            // Supervisor already gone (previous shutdown or exhaustion).
            return;
        }
        let _ = done_rx.await;
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        match *self.state_rx.borrow() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(self.terminal_error()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// The precise terminal error: explicit shutdown and exhausted recovery
    /// both park the client in `Closed`, but callers see different errors.
    fn terminal_error(&self) -> ClientError {
        self.shared
            .pending
            .close_reason()
            .map(ClientError::from)
            .unwrap_or(ClientError::Closed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::{MockConnector, TransportError};

    #[tokio::test]
    async fn test_initial_connect_failure_is_not_retried() {
        // Arrange: a connector that always refuses.
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|url| {
            Err(TransportError::Refused {
                url: url.to_string(),
            })
        });

        // Act
        let result =
            ConsoleClient::connect_with(ClientConfig::new("ws://desk"), Arc::new(connector)).await;

        // Assert: the error surfaces directly; `times(1)` above proves no
        // retry happened.
        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::Refused { .. }))
        ));
    }
}

//! In-process mock console for tests.
//!
//! [`MockConsole`] implements [`Connector`] over plain channels, so the full
//! client — supervisor, read loop, pending table, registry — can be exercised
//! without a network.  Tests script the console side explicitly:
//!
//! ```rust,ignore
//! let console = Arc::new(MockConsole::new());
//! let mut session = console.expect_session();   // first connect succeeds
//! console.refuse_next();                        // first reconnect attempt fails
//! let mut session2 = console.expect_session();  // second reconnect succeeds
//!
//! let client = ConsoleClient::connect_with(config, console.clone()).await?;
//! let env = session.sent_envelope().await.unwrap();
//! session.reply(&env.path, &env.method, json!({"ok": true})).await;
//! session.disconnect();                         // simulate a socket drop
//! ```
//!
//! Each planned session is consumed by one `connect` call, in order; a
//! `connect` with nothing planned is refused.  Dropping a [`MockSession`]
//! closes both directions, which the client observes as an unexpected
//! disconnect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use mixdesk_core::Envelope;

use super::{Connector, FrameSink, FrameStream, TransportError};

const CHANNEL_CAPACITY: usize = 64;

enum Planned {
    Accept {
        sink: MockFrameSink,
        stream: MockFrameStream,
    },
    Refuse,
}

/// A scriptable stand-in for the console's WebSocket endpoint.
pub struct MockConsole {
    planned: Mutex<VecDeque<Planned>>,
    attempts: AtomicU32,
}

impl MockConsole {
    pub fn new() -> Self {
        Self {
            planned: Mutex::new(VecDeque::new()),
            attempts: AtomicU32::new(0),
        }
    }

    /// Plans one accepted connection and returns the console-side handle
    /// for it.  Sessions are consumed in the order they were planned.
    pub fn expect_session(&self) -> MockSession {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (push_tx, push_rx) = mpsc::channel(CHANNEL_CAPACITY);

        self.planned
            .lock()
            .expect("mock console lock poisoned")
            .push_back(Planned::Accept {
                sink: MockFrameSink { tx: outbound_tx },
                stream: MockFrameStream { rx: push_rx },
            });

        MockSession {
            outbound: outbound_rx,
            push_tx,
        }
    }

    /// Plans one refused connection attempt.
    pub fn refuse_next(&self) {
        self.planned
            .lock()
            .expect("mock console lock poisoned")
            .push_back(Planned::Refuse);
    }

    /// How many times the client has tried to connect.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Default for MockConsole {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConsole {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let next = self
            .planned
            .lock()
            .expect("mock console lock poisoned")
            .pop_front();

        match next {
            Some(Planned::Accept { sink, stream }) => Ok((Box::new(sink), Box::new(stream))),
            Some(Planned::Refuse) | None => Err(TransportError::Refused {
                url: url.to_string(),
            }),
        }
    }
}

/// Console-side handle for one accepted session.
///
/// Dropping it closes both directions of the link, which the client sees as
/// an unexpected socket closure.
pub struct MockSession {
    outbound: mpsc::Receiver<String>,
    push_tx: mpsc::Sender<String>,
}

impl MockSession {
    /// The next raw frame the client wrote, or `None` once the client side
    /// is gone.
    pub async fn sent_frame(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// The next frame the client wrote, decoded as an envelope.
    ///
    /// Panics on a malformed frame: the client under test must never emit
    /// one.
    pub async fn sent_envelope(&mut self) -> Option<Envelope> {
        let frame = self.outbound.recv().await?;
        Some(Envelope::decode(&frame).expect("client sent a malformed frame"))
    }

    /// Delivers an envelope to the client.
    pub async fn push(&self, envelope: &Envelope) {
        let frame = envelope.encode().expect("test envelope must encode");
        self.push_frame(frame).await;
    }

    /// Delivers a raw text frame to the client (for malformed-frame tests).
    pub async fn push_frame(&self, frame: impl Into<String>) {
        // A send error means the client hung up first; tests observe that
        // through the client API, not here.
        let _ = self.push_tx.send(frame.into()).await;
    }

    /// Replies to a request the client sent: same `(path, method)`, given body.
    pub async fn reply(&self, path: &str, method: &str, body: serde_json::Value) {
        self.push(&Envelope::new(path, method, body)).await;
    }

    /// Simulates an unexpected socket drop.
    pub fn disconnect(self) {}
}

struct MockFrameSink {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl FrameSink for MockFrameSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct MockFrameStream {
    rx: mpsc::Receiver<String>,
}

#[async_trait]
impl FrameStream for MockFrameStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_planned_sessions_are_consumed_in_order() {
        // Arrange: accept, refuse, accept.
        let console = MockConsole::new();
        let _s1 = console.expect_session();
        console.refuse_next();
        let _s2 = console.expect_session();

        // Act / Assert
        assert!(console.connect("ws://mock").await.is_ok());
        assert!(matches!(
            console.connect("ws://mock").await,
            Err(TransportError::Refused { .. })
        ));
        assert!(console.connect("ws://mock").await.is_ok());
        // Nothing planned beyond that: refused.
        assert!(console.connect("ws://mock").await.is_err());
        assert_eq!(console.attempts(), 4);
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        // Arrange
        let console = MockConsole::new();
        let mut session = console.expect_session();
        let (mut sink, mut stream) = console.connect("ws://mock").await.unwrap();

        // Act / Assert: client → console.
        sink.send(r#"{"path":"/a","method":"GET","body":null}"#.to_string())
            .await
            .unwrap();
        let env = session.sent_envelope().await.unwrap();
        assert_eq!(env.path, "/a");

        // Console → client.
        session.reply("/a", "GET", serde_json::json!(1)).await;
        let frame = stream.next_frame().await.unwrap().unwrap();
        assert!(frame.contains(r#""path":"/a""#));
    }

    #[tokio::test]
    async fn test_dropping_session_closes_the_link() {
        // Arrange
        let console = MockConsole::new();
        let session = console.expect_session();
        let (mut sink, mut stream) = console.connect("ws://mock").await.unwrap();

        // Act
        session.disconnect();

        // Assert: reads end, writes fail.
        assert!(stream.next_frame().await.is_none());
        assert!(matches!(
            sink.send("x".to_string()).await,
            Err(TransportError::Closed)
        ));
    }
}

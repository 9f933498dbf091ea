//! The socket seam: traits the supervisor speaks through.
//!
//! The console's control API runs over WebSocket text frames, but nothing
//! above this module knows that.  The supervisor sees three capabilities:
//! connect, send-a-frame, receive-a-frame.  Splitting sink and stream lets
//! the read loop and the write path run concurrently without sharing a
//! socket object.
//!
//! Two implementations exist:
//!
//! - [`tungstenite::TungsteniteConnector`] — the production WebSocket client,
//! - [`mock::MockConsole`] — an in-process, channel-backed console for tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;
pub mod tungstenite;

pub use tungstenite::TungsteniteConnector;

/// Errors at the socket boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The peer refused the connection outright.
    #[error("connection refused by {url}")]
    Refused { url: String },

    /// A WebSocket protocol failure on an established connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The socket is closed; no further frames can be sent.
    #[error("socket closed")]
    Closed,
}

/// The write half: sends one text frame at a time.
///
/// The supervisor funnels every outbound frame through a single owner of
/// this sink, so frames are never interleaved mid-write.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one complete text frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Closes the socket gracefully.  Best effort; errors are ignorable.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// The read half: yields inbound text frames in arrival order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameStream: Send {
    /// The next text frame.  `None` means the socket closed (gracefully or
    /// not); `Some(Err(_))` is a transport failure that ends the session.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// Opens connections to the console.
///
/// The supervisor holds one connector for the lifetime of the client and
/// calls it again for every reconnect attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes one connection, returning its independently owned write
    /// and read halves.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError>;
}

//! Infrastructure layer for mixdesk-client.
//!
//! All I/O lives here:
//!
//! - [`transport`] — the socket seam.  The supervisor talks to the console
//!   through the `Connector`/`FrameSink`/`FrameStream` traits; production
//!   uses the tokio-tungstenite implementation, tests use the in-process
//!   mock console.
//! - [`supervisor`] — the connection supervisor: the only owner of the
//!   socket, the dedicated read loop, the serialized write path, and the
//!   reconnect/resubscribe machinery.

pub mod supervisor;
pub mod transport;

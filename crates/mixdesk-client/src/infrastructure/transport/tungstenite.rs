//! Production transport over tokio-tungstenite.
//!
//! tokio-tungstenite handles the RFC 6455 handshake, frame masking, and
//! protocol-level ping/pong automatically; this module only adapts its
//! sink/stream pair to the [`FrameSink`]/[`FrameStream`] seam and filters
//! the frame types down to the text frames the console protocol uses.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Connector, FrameSink, FrameStream, TransportError};

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the console over a real WebSocket.
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        // `connect_async` performs the TCP connect and the WebSocket HTTP
        // upgrade handshake in one step.
        let (ws_stream, _response) =
            connect_async(url)
                .await
                .map_err(|source| TransportError::Connect {
                    url: url.to_string(),
                    source,
                })?;

        debug!(url, "websocket connection established");

        // Split into independently owned halves so the read loop and the
        // write path can live in different tasks.
        let (sink, stream) = ws_stream.split();
        Ok((
            Box::new(WsFrameSink { inner: sink }),
            Box::new(WsFrameStream { inner: stream }),
        ))
    }
}

struct WsFrameSink {
    inner: SplitSink<WsConnection, WsMessage>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        // `SinkExt::send` flushes after queueing, so the frame is on the wire
        // (or the error is known) when this returns.
        self.inner.send(WsMessage::Text(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await?;
        Ok(())
    }
}

struct WsFrameStream {
    inner: SplitStream<WsConnection>,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let message = match self.inner.next().await {
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return None,
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            };

            match message {
                WsMessage::Text(text) => return Some(Ok(text)),

                WsMessage::Binary(payload) => {
                    // The console protocol is JSON-over-text; even "binary"
                    // metering arrives base64-encoded inside a text frame.
                    warn!(len = payload.len(), "unexpected binary frame (ignored)");
                }

                // Protocol-level keepalive; tungstenite queues the pong reply
                // automatically on the next write.
                WsMessage::Ping(_) | WsMessage::Pong(_) => {
                    debug!("websocket ping/pong");
                }

                WsMessage::Close(_) => {
                    debug!("websocket Close frame received");
                    return None;
                }

                WsMessage::Frame(_) => {
                    debug!("raw frame (ignored)");
                }
            }
        }
    }
}

//! mixdesk-client library crate.
//!
//! A stateful client for the REST-over-WebSocket control API of audio
//! mixing-console control software.  One physical socket carries all logical
//! traffic: request/response calls, console value subscriptions, metering
//! streams, and application-state notifications.  This crate multiplexes
//! concurrent calls over that socket, routes unsolicited pushes to the right
//! subscriber, and recovers from disconnects transparently — active
//! subscriptions are replayed after every successful reconnect.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Console (JSON envelopes over WebSocket)
//!         ↕
//! [mixdesk-client]
//!   ├── domain/           Pure types: config, lifecycle events, error taxonomy
//!   ├── application/      Coordination state: pending-request table,
//!   │                     subscription registry, reconnect backoff
//!   └── infrastructure/
//!         ├── transport/  Socket seam (tokio-tungstenite impl + test mock)
//!         └── supervisor/ Socket lifecycle, read loop, serialized writes,
//!                         reconnect + resubscribe replay
//!   client.rs             ConsoleClient façade composing all of the above
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async machinery beyond type definitions.
//! - `application` depends on `domain` and `mixdesk-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use mixdesk_client::{ClientConfig, ConsoleClient};
//! use mixdesk_core::{SubscriptionSpec, ValueFormat};
//!
//! # async fn example() -> Result<(), mixdesk_client::ClientError> {
//! let client = ConsoleClient::connect(ClientConfig::new("ws://192.168.1.40:80/socket")).await?;
//!
//! let muted = client
//!     .call("/ch/1/mix/on", "GET", serde_json::Value::Null, Duration::from_secs(2))
//!     .await?;
//! println!("mute state: {muted}");
//!
//! let (handle, mut updates) = client
//!     .subscribe(SubscriptionSpec::value("/ch/1/mix/fader", ValueFormat::Plain))
//!     .await?;
//! while let Some(update) = updates.recv().await {
//!     println!("fader moved: {update:?}");
//!     break;
//! }
//!
//! client.unsubscribe(handle).await?;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration, lifecycle events, error taxonomy.
pub mod domain;

/// Application layer: pending-request table, subscription registry, backoff.
pub mod application;

/// Infrastructure layer: transport seam and connection supervisor.
pub mod infrastructure;

mod client;

pub use client::ConsoleClient;
pub use domain::config::{ClientConfig, ReconnectPolicy};
pub use domain::error::ClientError;
pub use domain::events::{
    ConnectionEvent, ConnectionState, SubscriptionHandle, SubscriptionUpdate,
};
pub use infrastructure::transport::{Connector, TransportError};

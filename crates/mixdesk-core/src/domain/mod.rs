//! Domain layer: pure subscription types with no I/O dependencies.
//!
//! A [`SubscriptionSpec`] describes a standing registration declaratively so
//! the client can replay it after a reconnect without re-running caller code.

pub mod subscription;

pub use subscription::{SubscriptionSpec, ValueFormat};

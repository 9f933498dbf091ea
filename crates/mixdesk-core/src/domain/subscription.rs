//! Declarative subscription specifications.
//!
//! A subscription is a standing registration that must survive reconnects:
//! the client keeps the spec, and after a reconnect replays
//! `spec.subscribe_envelope()` instead of re-running arbitrary caller code.
//! Three kinds exist — console value pushes, metering streams, and
//! application-state notifications.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::protocol::envelope::Envelope;
use crate::protocol::paths;

/// Value delivery format for a console value subscription.
///
/// `Plain` delivers values in the parameter's native unit (e.g. dB for a
/// fader); `Norm` delivers values normalized to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Plain,
    Norm,
}

impl ValueFormat {
    /// The wire string for this format.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueFormat::Plain => "plain",
            ValueFormat::Norm => "norm",
        }
    }
}

impl std::fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declarative description of one logical subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionSpec {
    /// Push updates for a single console value path.
    Value {
        /// Console value path, e.g. `/ch/1/mix/fader`.
        path: String,
        /// Delivery format for pushed values.
        format: ValueFormat,
    },

    /// A real-time metering stream.
    Metering {
        /// Client-chosen session id; pushes arrive on
        /// `/console/metering2/{id}`.
        id: u32,
        /// Sample interval in milliseconds.
        interval_ms: u32,
        /// `true` selects the compact base64/i16 wire encoding,
        /// `false` the nested-JSON encoding.
        binary: bool,
        /// Console-defined channel selectors, passed through opaquely.
        /// Their order fixes the channel order of every decoded frame.
        params: Vec<serde_json::Value>,
    },

    /// Application-state change notifications.
    AppState,
}

impl SubscriptionSpec {
    /// Convenience constructor for a value subscription.
    pub fn value(path: impl Into<String>, format: ValueFormat) -> Self {
        SubscriptionSpec::Value {
            path: path.into(),
            format,
        }
    }

    /// Builds the envelope that registers this subscription with the console.
    pub fn subscribe_envelope(&self) -> Envelope {
        match self {
            SubscriptionSpec::Value { path, format } => Envelope::new(
                paths::VALUE_SUBSCRIBE_PATH,
                "POST",
                json!({ "path": path, "format": format.as_str() }),
            ),
            SubscriptionSpec::Metering {
                id,
                interval_ms,
                binary,
                params,
            } => Envelope::new(
                paths::METERING_PATH,
                "POST",
                json!({ "id": id, "interval": interval_ms, "binary": binary, "params": params }),
            ),
            SubscriptionSpec::AppState => {
                Envelope::new(paths::APP_STATE_SUBSCRIBE_PATH, "POST", serde_json::Value::Null)
            }
        }
    }

    /// Builds the envelope that tears this subscription down server-side.
    pub fn unsubscribe_envelope(&self) -> Envelope {
        match self {
            SubscriptionSpec::Value { path, format } => Envelope::new(
                paths::VALUE_UNSUBSCRIBE_PATH,
                "POST",
                json!({ "path": path, "format": format.as_str() }),
            ),
            SubscriptionSpec::Metering { id, .. } => Envelope::new(
                paths::metering_push_path(*id),
                "DELETE",
                serde_json::Value::Null,
            ),
            SubscriptionSpec::AppState => Envelope::new(
                paths::APP_STATE_UNSUBSCRIBE_PATH,
                "POST",
                serde_json::Value::Null,
            ),
        }
    }

    /// Duplicate-registration rule: two specs conflict when registering both
    /// would make inbound routing ambiguous.
    ///
    /// Value subscriptions conflict on the same `path` + `format` pair,
    /// metering subscriptions on the same session `id`, and at most one
    /// app-state subscription can exist.
    pub fn conflicts_with(&self, other: &SubscriptionSpec) -> bool {
        match (self, other) {
            (
                SubscriptionSpec::Value { path: a, format: fa },
                SubscriptionSpec::Value { path: b, format: fb },
            ) => a == b && fa == fb,
            (SubscriptionSpec::Metering { id: a, .. }, SubscriptionSpec::Metering { id: b, .. }) => {
                a == b
            }
            (SubscriptionSpec::AppState, SubscriptionSpec::AppState) => true,
            _ => false,
        }
    }

    /// Short human-readable identity for log messages and error text.
    pub fn describe(&self) -> String {
        match self {
            SubscriptionSpec::Value { path, format } => format!("value {path} ({format})"),
            SubscriptionSpec::Metering { id, .. } => format!("metering #{id}"),
            SubscriptionSpec::AppState => "app-state".to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Fire-and-forget record change notifications.
//!
//! # Responsibility
//! - Define the `record:created` / `record:updated` event envelope.
//! - Fan events out to registered sinks without failing the caller.
//!
//! # Invariants
//! - A sink failure never rolls back or fails the mutation that emitted it.

mod hub;

pub use hub::{NotificationHub, NotificationHubError};

use crate::model::record::RecordId;
use crate::now_epoch_ms;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Record lifecycle event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordEventType {
    #[serde(rename = "record:created")]
    Created,
    #[serde(rename = "record:updated")]
    Updated,
}

impl RecordEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "record:created",
            Self::Updated => "record:updated",
        }
    }
}

/// Event payload delivered to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvent {
    #[serde(rename = "type")]
    pub event_type: RecordEventType,
    pub module_name: String,
    pub record_id: RecordId,
    /// Epoch milliseconds at emission.
    pub timestamp: i64,
}

impl RecordEvent {
    pub fn now(event_type: RecordEventType, module_name: impl Into<String>, record_id: RecordId) -> Self {
        Self {
            event_type,
            module_name: module_name.into(),
            record_id,
            timestamp: now_epoch_ms(),
        }
    }
}

/// Delivery failure reported by one sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for SinkError {}

/// Receiver of record events.
pub trait NotificationSink: Send + Sync {
    /// Stable lowercase id used for registration and log lines.
    fn sink_id(&self) -> &str;
    fn publish(&self, event: &RecordEvent) -> Result<(), SinkError>;
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn sink_id(&self) -> &str {
        "noop"
    }

    fn publish(&self, _event: &RecordEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordEvent, RecordEventType};

    #[test]
    fn event_serializes_with_wire_names() {
        let event = RecordEvent {
            event_type: RecordEventType::Updated,
            module_name: "tickets".to_string(),
            record_id: 9,
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "record:updated");
        assert_eq!(json["moduleName"], "tickets");
        assert_eq!(json["recordId"], 9);
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
    }
}

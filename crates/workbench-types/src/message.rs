//! # Message Envelope
//!
//! The unit of communication on the tool bus.
//!
//! ## Properties
//!
//! - **Identity**: `id` is a fresh v4 UUID per message and is never reused.
//! - **Envelope Authority**: `source_tool_id` is the sole source of truth for
//!   the sender; access control never looks inside the payload.
//! - **Immutability**: only `retry_count` changes after creation, and it only
//!   increases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::events::ToolEvent;
use crate::ids::{EventType, ToolId};

/// A message travelling over the bus.
///
/// Serializes with camelCase keys (`sourceToolId`, `type`, `retryCount`) so the
/// diagnostic panel sees the same shape the tool panels send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier, generated at creation.
    pub id: Uuid,

    /// Tool that produced the message. `"system"` for bus-internal events.
    pub source_tool_id: ToolId,

    /// Recipient tool. `None` broadcasts to every subscriber of the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tool_id: Option<ToolId>,

    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Raw payload as sent. Typed by the schema registry on dispatch.
    pub payload: Value,

    /// Creation time.
    pub timestamp: DateTime<Utc>,

    /// Bus-level delivery attempts that failed so far.
    #[serde(default)]
    pub retry_count: u32,
}

impl Message {
    /// Build a message with a fresh id, the current time and no retries.
    pub fn new(
        event_type: impl Into<EventType>,
        payload: Value,
        source: impl Into<ToolId>,
        target: Option<ToolId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_tool_id: source.into(),
            target_tool_id: target,
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    /// A message with no target.
    pub fn broadcast(
        event_type: impl Into<EventType>,
        payload: Value,
        source: impl Into<ToolId>,
    ) -> Self {
        Self::new(event_type, payload, source, None)
    }

    /// A message addressed to a single tool.
    pub fn targeted(
        target: impl Into<ToolId>,
        event_type: impl Into<EventType>,
        payload: Value,
        source: impl Into<ToolId>,
    ) -> Self {
        Self::new(event_type, payload, source, Some(target.into()))
    }

    pub fn is_broadcast(&self) -> bool {
        self.target_tool_id.is_none()
    }

    /// Record one failed bus-level delivery attempt.
    pub fn record_failed_attempt(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }
}

/// What a subscriber receives: the envelope plus its validated, typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: Message,
    pub event: ToolEvent,
}

impl Delivery {
    pub fn new(message: Message, event: ToolEvent) -> Self {
        Self { message, event }
    }

    pub fn source(&self) -> &ToolId {
        &self.message.source_tool_id
    }

    pub fn target(&self) -> Option<&ToolId> {
        self.message.target_tool_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_has_no_target() {
        let msg = Message::broadcast("DATA_LOAD", json!({"datasetId": "1"}), "data-browser");
        assert!(msg.is_broadcast());
        assert_eq!(msg.retry_count, 0);
        assert_eq!(msg.source_tool_id, "data-browser");
    }

    #[test]
    fn test_fresh_ids() {
        let a = Message::broadcast("X", json!({}), "a");
        let b = Message::broadcast("X", json!({}), "a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let msg = Message::targeted("notebook", "NOTEBOOK_EXECUTE", json!({}), "settings");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["sourceToolId"], "settings");
        assert_eq!(value["targetToolId"], "notebook");
        assert_eq!(value["type"], "NOTEBOOK_EXECUTE");
        assert_eq!(value["retryCount"], 0);
    }

    #[test]
    fn test_retry_count_only_increases() {
        let mut msg = Message::broadcast("X", json!({}), "a");
        assert_eq!(msg.record_failed_attempt(), 1);
        assert_eq!(msg.record_failed_attempt(), 2);
        assert_eq!(msg.retry_count, 2);
    }
}

//! # Dead-Letter Queue
//!
//! Messages that failed validation, failed access control, or exhausted their
//! delivery attempts are filed here verbatim (including the final
//! `retry_count`) for operator inspection. The bus never requeues on its own;
//! re-submission is an explicit operator action.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;
use workbench_types::{Message, ToolId, ValidationError};

/// Why a message was dead-lettered.
#[derive(Debug, Clone, PartialEq)]
pub enum DeadLetterReason {
    /// Payload did not match the schema for its type.
    Validation(ValidationError),
    /// The target's allow-list excludes the source.
    Unauthorized { source: ToolId, target: ToolId },
    /// Bus-level delivery failed on every attempt.
    DeliveryExhausted { attempts: u32, last_error: String },
}

impl DeadLetterReason {
    /// Stable label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized { .. } => "unauthorized",
            Self::DeliveryExhausted { .. } => "delivery_exhausted",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::Unauthorized { source, target } => {
                write!(f, "{source} is not allowed to message {target}")
            }
            Self::DeliveryExhausted {
                attempts,
                last_error,
            } => write!(f, "delivery failed after {attempts} attempts: {last_error}"),
        }
    }
}

/// A message that could not be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub message: Message,
    pub reason: DeadLetterReason,
    pub failed_at: DateTime<Utc>,
}

/// Unbounded, most-recent-first list of dead letters.
#[derive(Default)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetter>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: Message, reason: DeadLetterReason) {
        self.entries.lock().push_front(DeadLetter {
            message,
            reason,
            failed_at: Utc::now(),
        });
    }

    /// Snapshot, most recent first.
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Remove and return the entry for `message_id`.
    pub fn take(&self, message_id: Uuid) -> Option<DeadLetter> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|d| d.message.id == message_id)?;
        entries.remove(index)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

//! # Error Types
//!
//! Errors shared by the bus and the tool panels.

use thiserror::Error;

/// Reasons a message fails schema validation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// The message id is the nil UUID.
    #[error("message id is nil")]
    NilId,

    /// No source tool on the envelope.
    #[error("message has no source tool id")]
    MissingSource,

    /// No event type on the envelope.
    #[error("message has no event type")]
    MissingType,

    /// The wildcard is a subscription type, not a message type.
    #[error("wildcard type `*` cannot be sent")]
    WildcardType,

    /// A target was given but it is blank.
    #[error("target tool id is empty")]
    EmptyTarget,

    /// Payload is JSON `null`.
    #[error("message payload is null")]
    MissingPayload,

    /// Payload does not match the declared shape for its type.
    #[error("invalid {event_type} payload: {reason}")]
    InvalidPayload { event_type: String, reason: String },

    /// A numeric field is outside its allowed range.
    #[error("{event_type}.{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        event_type: String,
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl ValidationError {
    pub fn invalid(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned by a subscriber callback.
///
/// Isolated per subscriber: it is logged and never stops delivery to the
/// remaining subscribers of the same message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn msg(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

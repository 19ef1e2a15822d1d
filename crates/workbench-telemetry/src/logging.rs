//! Structured logging helpers.
//!
//! Every bus or panel log line carries a consistent set of fields so the JSON
//! output can be filtered per tool:
//! - `tool`: tool identifier (notebook, labeling, etc.)
//! - `event_type`: message type tag, when the line is about a message
//! - `message_id`: message UUID, when the line is about a message
//! - Additional context fields

/// Log a line attributed to a tool panel.
#[macro_export]
macro_rules! log_tool_event {
    ($level:ident, $tool:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            tool = %$tool,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a line about a specific bus message with standard fields.
#[macro_export]
macro_rules! log_message_event {
    ($level:ident, $msg:expr, $message:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            tool = %$message.source_tool_id,
            event_type = %$message.event_type,
            message_id = %$message.id,
            $($($field)*,)?
            $msg
        )
    };
}

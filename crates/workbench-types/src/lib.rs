//! # Workbench Types Crate
//!
//! This crate contains the message envelope, tool identifiers and typed tool
//! events exchanged over the workbench tool bus.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every shape that crosses the bus is defined here.
//! - **Raw on the wire, typed on delivery**: a [`Message`] carries its payload as
//!   raw JSON; the bus schema registry turns it into a [`ToolEvent`] before any
//!   subscriber sees it.
//! - **Envelope Authority**: `source_tool_id` on the envelope is the only
//!   identity the access-control layer trusts.

pub mod errors;
pub mod events;
pub mod ids;
pub mod message;

pub use errors::{HandlerError, ValidationError};
pub use events::*;
pub use ids::{EventType, ToolId};
pub use message::{Delivery, Message};

//! Shared value types for the axon agent execution core.
//!
//! Everything in this crate is a plain serializable value: events, the
//! LLM-facing message types, tool wire types, configuration, and the shared
//! error sum. No I/O lives here.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod state;
pub mod tool;
pub mod trace;
pub mod usage;

pub use error::{Error, Result};
pub use event::{
    Action, CallFields, Event, EventId, Observation, Payload, SecurityRisk, Source,
};
pub use message::{ContentPart, Message, MessageContent, Role};
pub use state::{AgentState, State};
pub use tool::{ToolCall, ToolDefinition, ToolOutput};
pub use usage::{LlmUsage, ToolCallMetadata};

//! Message history and context budget management.
//!
//! The event log is the source of truth; [`history::project_events`] turns
//! it into the LLM-facing message list, and [`manager::ContextManager`]
//! keeps that list under the configured token budget by truncation or
//! LLM-assisted summarization.

pub mod history;
pub mod manager;
pub mod tokens;

pub use history::{project_events, MessageHistory};
pub use manager::{ContextManager, Summarizer};
pub use tokens::{count_message, count_messages};

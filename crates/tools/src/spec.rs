//! The tool plug-in interface.

use std::path::PathBuf;
use std::time::Duration;

use axon_domain::error::Result;
use axon_domain::tool::{ToolDefinition, ToolOutput};
use serde_json::Value;

use crate::cancel::CancelToken;

/// Per-call execution context handed to every tool.
///
/// Tools receive a session handle, never a back-pointer into the runtime.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    /// Filesystem root the tool's file I/O is confined to.
    pub workspace_root: PathBuf,
    /// Cooperative cancellation; long-running tools should poll or select
    /// on this and abort early.
    pub cancel: CancelToken,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            workspace_root: workspace_root.into(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A pluggable tool.
///
/// `input_schema` is the JSON-Schema subset the manager validates inputs
/// against before `run` is ever called; a tool can therefore trust the
/// declared required fields to be present and well-typed.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// Description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON-Schema subset: object with typed properties and a required list.
    fn input_schema(&self) -> Value;

    /// Optional per-call timeout; the controller clamps it to the system
    /// maximum and enforces it from the outside.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn run(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput>;
}

impl dyn Tool {
    /// The descriptor sent to the LLM client.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            input_schema: self.input_schema(),
        }
    }
}

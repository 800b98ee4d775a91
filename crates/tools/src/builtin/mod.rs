//! Built-in tools: session control plus default workspace bindings.
//!
//! The control tools (`complete`, `message_user`,
//! `return_control_to_general_agent`) are the ones the controller must
//! recognize. The workspace tools (file read/write/edit, command run) are
//! the default bindings that make the CLI usable end-to-end; everything
//! else plugs in through the [`crate::Tool`] trait.

pub mod control;
pub mod exec;
pub mod file_ops;

use std::sync::Arc;

use crate::registry::ToolRegistry;

/// The default registry for a main agent: control tools + workspace tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(control::CompleteTool))
        .register(Arc::new(control::MessageUserTool))
        .register(Arc::new(file_ops::FileReadTool))
        .register(Arc::new(file_ops::FileWriteTool))
        .register(Arc::new(file_ops::FileEditTool))
        .register(Arc::new(exec::CmdRunTool));
    registry
}

/// The registry a reviewer session sees: the same workspace tools, but the
/// reviewer-specific completion tool instead of `complete`.
pub fn reviewer_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(control::ReturnControlTool))
        .register(Arc::new(file_ops::FileReadTool))
        .register(Arc::new(file_ops::FileWriteTool))
        .register(Arc::new(file_ops::FileEditTool))
        .register(Arc::new(exec::CmdRunTool));
    registry
}

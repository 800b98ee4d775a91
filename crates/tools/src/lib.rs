//! Tool plug-in interface, registry, and dispatcher.
//!
//! A tool is a value implementing [`Tool`]; the process-wide
//! [`ToolRegistry`] maps names to tools, and the per-session
//! [`ToolManager`] is the sole dispatch path turning an Action into an
//! Observation (validation, execution, output capping, completion state).

pub mod builtin;
pub mod cancel;
pub mod manager;
pub mod registry;
pub mod schema;
pub mod spec;

pub use cancel::CancelToken;
pub use manager::ToolManager;
pub use registry::ToolRegistry;
pub use spec::{Tool, ToolContext};

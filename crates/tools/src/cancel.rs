//! Per-session cancellation token.
//!
//! Level-triggered: once set it stays set until explicitly cleared (which
//! happens when a new user message is accepted). The runtime checks it at
//! every suspension point; tools that support cooperative cancellation
//! receive it through [`crate::ToolContext`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation flag shared between the controller and in-flight tools.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clear the flag (a new user message was accepted).
    pub fn clear(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

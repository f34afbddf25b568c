//! Shared shutdown state.
//!
//! # State Transitions
//! ```text
//! Running → ShuttingDown   (exactly once, by the orchestrator)
//! ```
//!
//! # Design Decisions
//! - Single writer (orchestrator), many readers (interceptor, checks)
//! - Backed by a watch channel so the transition is checked and applied atomically

use std::sync::Arc;

use tokio::sync::watch;

/// Whether shutdown has begun. Cheap to clone; clones share the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownState {
    /// Create a new state (not shutting down).
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Check if shutdown has begun (non-blocking).
    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flip to shutting down. Returns `true` only for the call that performed
    /// the transition.
    pub(crate) fn begin(&self) -> bool {
        self.tx.send_if_modified(|shutting_down| {
            if *shutting_down {
                false
            } else {
                *shutting_down = true;
                true
            }
        })
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

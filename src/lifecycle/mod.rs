//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     Configured signals → same handler → ShutdownOrchestrator::initiate_shutdown
//!
//! Shutdown (shutdown.rs):
//!     Flip state → before_shutdown → drain → on_signal → on_shutdown → terminate
//!
//! State (state.rs):
//!     Running → ShuttingDown, read by the health interceptor
//!
//! Process (process.rs):
//!     exit(code) | restore default disposition + re-raise
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: readiness fails first, then drain, then cleanup
//! - Drain has a timeout: stragglers are force-closed after the deadline
//! - Failure anywhere exits with code 1

pub mod process;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use process::{OsProcess, ProcessControl};
pub use shutdown::{Drain, ExitMode, Hook, Hooks, ShutdownOrchestrator, Termination};
pub use signals::SignalTraps;
pub use state::ShutdownState;

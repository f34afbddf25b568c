//! Process termination.
//!
//! # Responsibilities
//! - Exit the process with a code
//! - Restore a signal's default disposition and re-raise it, so a supervisor
//!   observes a conventional signal death
//!
//! # Design Decisions
//! - Behind a trait so the orchestrator can be driven without ending the process

use nix::sys::signal::{self, SigHandler, Signal};

/// OS services used to terminate the process.
pub trait ProcessControl: Send + Sync {
    /// Exit with the given code.
    fn exit(&self, code: i32);

    /// Restore the default disposition of `signal` and deliver it to this process.
    fn reraise(&self, signal: Signal);
}

/// The real process.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcess;

impl ProcessControl for OsProcess {
    fn exit(&self, code: i32) {
        std::process::exit(code)
    }

    fn reraise(&self, sig: Signal) {
        // SAFETY: installing SIG_DFL does not run any Rust code in signal context.
        let restored = unsafe { signal::signal(sig, SigHandler::SigDfl) };
        if let Err(e) = restored.and_then(|_| signal::raise(sig)) {
            tracing::error!(signal = %sig, error = %e, "Failed to re-raise signal");
            std::process::exit(128 + sig as i32);
        }
        // Still alive: the default action of this signal is to ignore it.
        tracing::debug!(signal = %sig, "Signal ignored by default disposition, exiting");
        std::process::exit(0)
    }
}

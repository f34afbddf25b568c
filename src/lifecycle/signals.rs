//! OS signal handling.
//!
//! # Responsibilities
//! - Register a listener for every configured signal
//! - Route each delivery to the same handler
//! - Remove the listeners again before the signal is re-raised
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Each delivery runs the handler in its own task, so a second signal is
//!   seen while the first shutdown is still running
//! - Duplicate deliveries are not filtered here; the orchestrator ignores them

use std::future::Future;
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::error::LameduckError;

/// Listener tasks for the trapped signals.
#[derive(Debug)]
pub struct SignalTraps {
    signals: Vec<Signal>,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalTraps {
    /// Trap every signal in `signals`, invoking `handler` on each delivery.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install<F, Fut>(signals: &[Signal], handler: F) -> Result<Self, LameduckError>
    where
        F: Fn(Signal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let mut tasks = Vec::with_capacity(signals.len());

        for &sig in signals {
            let mut stream = match signal(SignalKind::from_raw(sig as i32)) {
                Ok(stream) => stream,
                Err(source) => {
                    tasks.iter().for_each(JoinHandle::abort);
                    return Err(LameduckError::Signal {
                        signal: sig,
                        source,
                    });
                }
            };
            let handler = Arc::clone(&handler);
            tasks.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    tracing::info!(signal = %sig, "Received signal");
                    tokio::spawn(handler(sig));
                }
            }));
        }

        tracing::debug!(signals = ?signals, "Signal traps installed");
        Ok(Self {
            signals: signals.to_vec(),
            tasks,
        })
    }

    /// Stop listening. Handlers already running are not affected.
    pub fn remove(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::debug!(signals = ?self.signals, "Signal traps removed");
    }
}

//! Open connection accounting for drain reports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    open: AtomicU64,
    accepted: AtomicU64,
}

/// Counts the open connections of one server.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counters: Arc<Counters>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly accepted connection until the returned guard drops.
    pub fn track(&self) -> ConnectionGuard {
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        let id = self.counters.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(connection_id = id, "Connection opened");
        ConnectionGuard {
            counters: Arc::clone(&self.counters),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.counters.open.load(Ordering::SeqCst)
    }
}

/// Held by a connection task. Dropping it, including by aborting the task,
/// releases the connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    id: u64,
}

impl ConnectionGuard {
    /// Accept order within the server, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = self.id, "Connection closed");
    }
}

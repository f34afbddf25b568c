//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept)
//!     → connection.rs (lifetime tracking)
//!     → server.rs (hyper connection, drained on shutdown)
//!     → application service (wrapped by the health interceptor)
//! ```
//!
//! # Design Decisions
//! - Each connection tracked for graceful shutdown
//! - Drain is bounded: connections still open at the deadline are aborted

pub mod connection;
pub mod listener;
pub mod server;

pub use listener::{Listener, ListenerError};
pub use server::{serve, DrainReport, ServerHandle};

//! Graceful shutdown and health checks for HTTP servers.

pub mod config;
pub mod error;
pub mod health;
pub mod lameduck;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::LameduckConfig;
pub use error::{CheckError, HealthCheckError, LameduckError};
pub use lameduck::{Lameduck, LameduckBuilder, Running};
pub use lifecycle::{ShutdownState, Termination};
pub use net::Listener;

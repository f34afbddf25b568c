//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! health/ and lifecycle/ produce:
//!     → logging.rs Logger sink (typed LogEvent, replaceable)
//!     → tracing events (structured fields)
//!
//! Consumers:
//!     → tracing-subscriber fmt layer (stdout)
//! ```

pub mod logging;

pub use logging::{init_logging, LogEvent, Logger};

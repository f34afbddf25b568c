//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, signal resolution)
//!     → Settings (validated, immutable)
//!     → consumed once by LameduckBuilder::build
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{HealthConfig, LameduckConfig, ListenerConfig, LoggingConfig, ResponseConfig};
pub use validation::{parse_signal, validate_config, Settings, ValidationError};

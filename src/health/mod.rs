//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Request (interceptor.rs):
//!     Path lookup in registry.rs
//!     → not registered: wrapped application
//!     → registered: shutdown state consulted, check executed
//!     → response.rs renders (status, headers, JSON body)
//! ```
//!
//! # Design Decisions
//! - Purely additive: unregistered paths are never altered
//! - Checks receive the shutdown state so they can tell liveness from readiness
//! - Check failures are rendered, never propagated

pub mod interceptor;
pub mod registry;
pub mod response;

pub use interceptor::{HealthCheckLayer, HealthCheckService, HealthContext};
pub use registry::{CheckResult, HealthCheck, HealthCheckRegistry, RegistryOptions};
pub use response::{render_failure, render_success, HealthResponse, ResponseSettings};

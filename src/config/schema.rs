//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Hooks, health check functions and the logger sink are not part of the
//! file format; they are supplied in code through `LameduckBuilder`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LameduckConfig {
    /// Single signal to trap. Always merged into `signals`.
    pub signal: String,

    /// Additional signals to trap.
    pub signals: Vec<String>,

    /// Drain timeout in milliseconds.
    pub timeout_ms: u64,

    /// Match health check routes case-insensitively.
    pub case_insensitive: bool,

    /// Answer health checks with a failure once shutdown has begun.
    pub send_failures_during_shutdown: bool,

    /// Exit with code 0 instead of re-raising the received signal.
    pub use_exit0: bool,

    /// Status codes, bodies and headers of health responses.
    pub responses: ResponseConfig,

    /// Health check registry flags.
    pub health: HealthConfig,

    /// Listener settings (demo binary).
    pub listener: ListenerConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for LameduckConfig {
    fn default() -> Self {
        Self {
            signal: "SIGTERM".to_string(),
            signals: Vec::new(),
            timeout_ms: 1000,
            case_insensitive: false,
            send_failures_during_shutdown: true,
            use_exit0: false,
            responses: ResponseConfig::default(),
            health: HealthConfig::default(),
            listener: ListenerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Health response shaping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Status code of a passing check.
    pub status_ok: u16,

    /// Body of a passing check.
    pub status_ok_response: Map<String, Value>,

    /// Status code of a failing check.
    pub status_error: u16,

    /// Body of a failing check.
    pub status_error_response: Map<String, Value>,

    /// Extra headers added to every health response.
    pub headers: BTreeMap<String, String>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status_ok: 200,
            status_ok_response: status_body("ok"),
            status_error: 503,
            status_error_response: status_body("error"),
            headers: BTreeMap::new(),
        }
    }
}

fn status_body(status: &str) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("status".to_string(), Value::String(status.to_string()));
    body
}

/// Health check registry flags.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Merge a check's payload fields directly into the success body.
    pub verbatim: bool,

    /// Include error source chains in failure bodies.
    pub unsafe_expose_stack_traces: bool,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

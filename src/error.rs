//! Error types.
//!
//! # Kinds
//! - `HealthCheckError`: expected check failure carrying structured causes
//! - `CheckError`: whatever a check returned, structured or not, plus status overrides
//! - `RegistryError`: lookup of a path with no registered check
//! - `ShutdownError`: any failed shutdown phase, always fatal
//! - `LameduckError`: setup failures (config, bind, signal registration)
//!
//! # Design Decisions
//! - Health check failures are rendered as HTTP responses, never propagated
//! - `CheckError` deliberately does not implement `std::error::Error` so that
//!   every error type converts into it with `?`

use std::fmt;

use axum::http::StatusCode;
use nix::sys::signal::Signal;
use serde_json::{Map, Value};

use crate::config::ConfigError;
use crate::net::listener::ListenerError;

/// Boxed error used by hooks and generic check failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error captured from a failing dependency, kept in serializable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Top-level error message.
    pub message: String,
    /// Messages of the error's source chain, outermost first.
    pub stack: Vec<String>,
}

impl ErrorDetail {
    /// Capture an error and its source chain.
    pub fn capture(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            stack,
        }
    }

    /// Serialize field by field. The source chain is only emitted when exposed.
    pub fn to_json(&self, expose_stack: bool) -> Value {
        let mut fields = Map::new();
        fields.insert("message".into(), Value::String(self.message.clone()));
        if expose_stack {
            fields.insert(
                "stack".into(),
                Value::Array(self.stack.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(fields)
    }
}

/// Structured payload describing why a health check failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Causes {
    /// Arbitrary JSON, rendered verbatim.
    Json(Value),
    /// Captured errors, rendered as a list of minimized error objects.
    Errors(Vec<ErrorDetail>),
}

impl Causes {
    /// Render the causes as the `error`/`details` value of a failure response.
    pub fn to_json(&self, expose_stack: bool) -> Value {
        match self {
            Causes::Json(value) => value.clone(),
            Causes::Errors(errors) => {
                Value::Array(errors.iter().map(|e| e.to_json(expose_stack)).collect())
            }
        }
    }
}

/// A health check failure with structured causes.
///
/// The causes become the `error` and `details` fields of the failure response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HealthCheckError {
    message: String,
    causes: Causes,
}

impl HealthCheckError {
    /// Create a health check error with JSON causes.
    pub fn new(message: impl Into<String>, causes: impl Into<Value>) -> Self {
        Self {
            message: message.into(),
            causes: Causes::Json(causes.into()),
        }
    }

    /// Create a health check error whose causes are other errors.
    pub fn from_errors<'a, I>(message: impl Into<String>, errors: I) -> Self
    where
        I: IntoIterator<Item = &'a (dyn std::error::Error + 'static)>,
    {
        Self {
            message: message.into(),
            causes: Causes::Errors(errors.into_iter().map(ErrorDetail::capture).collect()),
        }
    }

    pub fn causes(&self) -> &Causes {
        &self.causes
    }
}

#[derive(Debug)]
enum Reason {
    HealthCheck(HealthCheckError),
    Other(BoxError),
}

/// The failure value of a health check.
///
/// Any error converts into a `CheckError`, so checks can use `?` freely.
/// A converted `HealthCheckError` keeps its structured causes.
#[derive(Debug)]
pub struct CheckError {
    reason: Reason,
    status_code: Option<StatusCode>,
    status_response: Option<Map<String, Value>>,
}

impl CheckError {
    /// Wrap an already boxed error.
    pub fn from_boxed(error: BoxError) -> Self {
        let reason = match error.downcast::<HealthCheckError>() {
            Ok(health) => Reason::HealthCheck(*health),
            Err(other) => Reason::Other(other),
        };
        Self {
            reason,
            status_code: None,
            status_response: None,
        }
    }

    /// Create a generic failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::from_boxed(message.into())
    }

    /// Override the configured error status code for this failure.
    pub fn with_status_code(mut self, status: StatusCode) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Override the configured error body for this failure.
    pub fn with_status_response(mut self, body: Map<String, Value>) -> Self {
        self.status_response = Some(body);
        self
    }

    /// Structured causes, present only for `HealthCheckError` failures.
    pub fn causes(&self) -> Option<&Causes> {
        match &self.reason {
            Reason::HealthCheck(error) => Some(error.causes()),
            Reason::Other(_) => None,
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.status_code
    }

    pub fn status_response(&self) -> Option<&Map<String, Value>> {
        self.status_response.as_ref()
    }

    /// The underlying error.
    pub fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match &self.reason {
            Reason::HealthCheck(error) => error,
            Reason::Other(error) => error.as_ref(),
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_error(), f)
    }
}

impl<E> From<E> for CheckError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::from_boxed(Box::new(error))
    }
}

/// Registry lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A request reached check execution with no matching registration.
    #[error("no health check registered for {0}")]
    NotFound(String),
}

/// Shutdown phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BeforeShutdown,
    Drain,
    OnSignal,
    OnShutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::BeforeShutdown => "before_shutdown",
            Phase::Drain => "drain",
            Phase::OnSignal => "on_signal",
            Phase::OnShutdown => "on_shutdown",
        };
        f.write_str(name)
    }
}

/// Draining the listener failed.
#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    /// The accept loop terminated without reporting.
    #[error("server task exited before draining completed")]
    ServerGone,
}

/// A failed shutdown phase. Always terminates the process with exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("{phase} hook failed: {source}")]
    Hook {
        phase: Phase,
        #[source]
        source: BoxError,
    },
    #[error("failed to drain connections: {0}")]
    Drain(#[from] DrainError),
}

impl ShutdownError {
    pub fn phase(&self) -> Phase {
        match self {
            ShutdownError::Hook { phase, .. } => *phase,
            ShutdownError::Drain(_) => Phase::Drain,
        }
    }
}

/// Errors raised while wiring up a decorated server.
#[derive(Debug, thiserror::Error)]
pub enum LameduckError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to trap {signal}: {source}")]
    Signal {
        signal: Signal,
        #[source]
        source: std::io::Error,
    },
}

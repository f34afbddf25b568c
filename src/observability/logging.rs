//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Provide the `Logger` sink invoked on check and shutdown failures
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Log level configurable via config, overridden by `RUST_LOG`
//! - The default sink forwards to tracing; callers may replace it

use std::fmt;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{CheckError, ShutdownError};

/// Initialize the global tracing subscriber.
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.filter.as_str().into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// An event handed to the `Logger` sink.
#[derive(Debug)]
pub enum LogEvent<'a> {
    /// A registered check failed; the failure response is being sent.
    HealthCheckFailed { path: &'a str, error: &'a CheckError },
    /// `on_send_failure_during_shutdown` returned an error.
    SendFailureHookFailed {
        path: &'a str,
        error: &'a (dyn std::error::Error + Send + Sync),
    },
    /// A shutdown phase failed; the process exits with code 1.
    ShutdownFailed { error: &'a ShutdownError },
}

impl fmt::Display for LogEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEvent::HealthCheckFailed { .. } => f.write_str("healthcheck failed"),
            LogEvent::SendFailureHookFailed { .. } => {
                f.write_str("on_send_failure_during_shutdown hook failed")
            }
            LogEvent::ShutdownFailed { .. } => f.write_str("error happened during shutdown"),
        }
    }
}

/// Sink for failure events.
#[derive(Clone)]
pub struct Logger(Arc<dyn Fn(&LogEvent<'_>) + Send + Sync>);

impl Logger {
    /// Use a custom sink.
    pub fn new(sink: impl Fn(&LogEvent<'_>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(sink))
    }

    /// The default sink, forwarding to tracing.
    pub fn tracing() -> Self {
        Self::new(trace_event)
    }

    pub fn log(&self, event: &LogEvent<'_>) {
        (self.0)(event)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

fn trace_event(event: &LogEvent<'_>) {
    match event {
        LogEvent::HealthCheckFailed { path, error } => {
            tracing::warn!(path = %path, error = %error, "{event}");
        }
        LogEvent::SendFailureHookFailed { path, error } => {
            tracing::warn!(path = %path, error = %error, "{event}");
        }
        LogEvent::ShutdownFailed { error } => {
            tracing::error!(phase = %error.phase(), error = %error, "{event}");
        }
    }
}

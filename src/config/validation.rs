//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Resolve signal names into trappable signals
//! - Validate value ranges (status codes valid)
//! - Parse extra response headers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LameduckConfig → Result<Settings, Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::str::FromStr;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use nix::sys::signal::Signal;

use crate::config::schema::LameduckConfig;
use crate::health::response::ResponseSettings;
use crate::lifecycle::shutdown::ExitMode;

/// Signals that cannot be caught.
const UNTRAPPABLE: [Signal; 5] = [
    Signal::SIGKILL,
    Signal::SIGSTOP,
    Signal::SIGILL,
    Signal::SIGFPE,
    Signal::SIGSEGV,
];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown signal {0:?}")]
    UnknownSignal(String),
    #[error("signal {0} cannot be trapped")]
    UntrappableSignal(Signal),
    #[error("{field} is not a valid HTTP status code: {code}")]
    InvalidStatus { field: &'static str, code: u16 },
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),
    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),
}

/// Validated, resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Signals to trap; never empty.
    pub signals: Vec<Signal>,
    pub drain_timeout: Duration,
    pub case_insensitive: bool,
    pub send_failures_during_shutdown: bool,
    pub exit_mode: ExitMode,
    pub responses: ResponseSettings,
    pub verbatim: bool,
    pub expose_stack_traces: bool,
}

/// Parse a signal name. Accepts `SIGTERM`, `sigterm` and `TERM`.
pub fn parse_signal(name: &str) -> Result<Signal, ValidationError> {
    let upper = name.trim().to_ascii_uppercase();
    let canonical = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    let signal = Signal::from_str(&canonical)
        .map_err(|_| ValidationError::UnknownSignal(name.to_string()))?;
    if UNTRAPPABLE.contains(&signal) {
        return Err(ValidationError::UntrappableSignal(signal));
    }
    Ok(signal)
}

/// Validate the configuration and resolve it into `Settings`.
pub fn validate_config(config: &LameduckConfig) -> Result<Settings, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut signals = Vec::new();
    for name in config.signals.iter().chain(std::iter::once(&config.signal)) {
        match parse_signal(name) {
            Ok(signal) if !signals.contains(&signal) => signals.push(signal),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }
    }

    let status_ok = status(config.responses.status_ok, "status_ok", &mut errors);
    let status_error = status(config.responses.status_error, "status_error", &mut errors);

    let mut headers = HeaderMap::new();
    for (name, value) in &config.responses.headers {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
            continue;
        };
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                headers.insert(header_name, header_value);
            }
            Err(_) => errors.push(ValidationError::InvalidHeaderValue(name.clone())),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Settings {
        signals,
        drain_timeout: Duration::from_millis(config.timeout_ms),
        case_insensitive: config.case_insensitive,
        send_failures_during_shutdown: config.send_failures_during_shutdown,
        exit_mode: if config.use_exit0 {
            ExitMode::ExitZero
        } else {
            ExitMode::Reraise
        },
        responses: ResponseSettings {
            status_ok,
            status_ok_response: config.responses.status_ok_response.clone(),
            status_error,
            status_error_response: config.responses.status_error_response.clone(),
            headers,
        },
        verbatim: config.health.verbatim,
        expose_stack_traces: config.health.unsafe_expose_stack_traces,
    })
}

fn status(code: u16, field: &'static str, errors: &mut Vec<ValidationError>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or_else(|_| {
        errors.push(ValidationError::InvalidStatus { field, code });
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

//! Health response formatting.
//!
//! # Shapes
//! ```text
//! success, no info         → status_ok     {status_ok_response}
//! success, info            → status_ok     {status_ok_response, info, details: info}
//! success, info, verbatim  → status_ok     {status_ok_response, ...info}
//! failure, no causes       → status_error  {status_error_response}
//! failure, causes          → status_error  {status_error_response, error, details: error}
//! ```
//! A failure may override the status code and base body per error.
//!
//! # Design Decisions
//! - Pure functions; no I/O
//! - Errors are serialized field by field, source chains only when exposed

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

use crate::error::CheckError;

/// Configured status codes, base bodies and extra headers.
#[derive(Debug, Clone)]
pub struct ResponseSettings {
    pub status_ok: StatusCode,
    pub status_ok_response: Map<String, Value>,
    pub status_error: StatusCode,
    pub status_error_response: Map<String, Value>,
    pub headers: HeaderMap,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        let status = |s: &str| {
            let mut body = Map::new();
            body.insert("status".into(), Value::String(s.into()));
            body
        };
        Self {
            status_ok: StatusCode::OK,
            status_ok_response: status("ok"),
            status_error: StatusCode::SERVICE_UNAVAILABLE,
            status_error_response: status("error"),
            headers: HeaderMap::new(),
        }
    }
}

/// A rendered health response.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Json(self.body)).into_response()
    }
}

fn headers(settings: &ResponseSettings) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    for (name, value) in &settings.headers {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

/// Render a passing check.
pub fn render_success(
    info: Option<&Value>,
    verbatim: bool,
    settings: &ResponseSettings,
) -> HealthResponse {
    let mut body = settings.status_ok_response.clone();
    match info {
        None | Some(Value::Null) => {}
        Some(Value::Object(fields)) if verbatim => {
            body.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(info) => {
            body.insert("info".into(), info.clone());
            body.insert("details".into(), info.clone());
        }
    }
    HealthResponse {
        status: settings.status_ok,
        headers: headers(settings),
        body: Value::Object(body),
    }
}

/// Render a failing check. `None` is the failure sent during shutdown.
pub fn render_failure(
    error: Option<&CheckError>,
    expose_stack: bool,
    settings: &ResponseSettings,
) -> HealthResponse {
    let status = error
        .and_then(CheckError::status_code)
        .unwrap_or(settings.status_error);
    let mut body = error
        .and_then(CheckError::status_response)
        .unwrap_or(&settings.status_error_response)
        .clone();
    if let Some(causes) = error.and_then(CheckError::causes) {
        let rendered = causes.to_json(expose_stack);
        body.insert("error".into(), rendered.clone());
        body.insert("details".into(), rendered);
    }
    HealthResponse {
        status,
        headers: headers(settings),
        body: Value::Object(body),
    }
}

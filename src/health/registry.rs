//! Health check registry.
//!
//! # Responsibilities
//! - Map route paths to check functions
//! - Resolve request paths, optionally case-insensitively
//! - Hold the formatting flags that apply to every registered check
//!
//! # Design Decisions
//! - Immutable once built
//! - Keys are folded once at construction; request paths are folded per lookup
//! - Exact path match only, the query string is not part of the path

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::error::{CheckError, RegistryError};
use crate::lifecycle::ShutdownState;

/// What a check resolves to: an optional `info` payload, or a failure.
pub type CheckResult = Result<Option<Value>, CheckError>;

/// A registered check function. Receives the shared shutdown state.
#[derive(Clone)]
pub struct HealthCheck(Arc<dyn Fn(ShutdownState) -> BoxFuture<'static, CheckResult> + Send + Sync>);

impl HealthCheck {
    pub fn new<F, Fut, E>(f: F) -> Self
    where
        F: Fn(ShutdownState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, E>> + Send + 'static,
        E: Into<CheckError>,
    {
        Self(Arc::new(move |state| {
            f(state).map(|r| r.map_err(Into::<CheckError>::into)).boxed()
        }))
    }

    /// Run the check. No timeout is applied.
    pub async fn run(&self, state: ShutdownState) -> CheckResult {
        (self.0)(state).await
    }
}

impl fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HealthCheck")
    }
}

/// Flags fixed for the whole registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryOptions {
    pub case_insensitive: bool,
    pub verbatim: bool,
    pub expose_stack_traces: bool,
}

/// Immutable mapping from route path to check.
#[derive(Debug, Clone, Default)]
pub struct HealthCheckRegistry {
    checks: HashMap<String, HealthCheck>,
    options: RegistryOptions,
}

impl HealthCheckRegistry {
    pub fn new<I, P>(checks: I, options: RegistryOptions) -> Self
    where
        I: IntoIterator<Item = (P, HealthCheck)>,
        P: Into<String>,
    {
        let mut map = HashMap::new();
        for (path, check) in checks {
            let path: String = path.into();
            let key = fold(&path, options.case_insensitive).into_owned();
            if map.insert(key, check).is_some() {
                tracing::warn!(path = %path, "Health check registered twice, keeping the last one");
            }
        }
        Self {
            checks: map,
            options,
        }
    }

    /// Find the check registered for a request path.
    pub fn resolve(&self, path: &str) -> Option<&HealthCheck> {
        self.checks.get(&*fold(path, self.options.case_insensitive))
    }

    /// Run the check registered for `path`.
    pub async fn execute(
        &self,
        path: &str,
        state: ShutdownState,
    ) -> Result<CheckResult, RegistryError> {
        let check = self
            .resolve(path)
            .ok_or_else(|| RegistryError::NotFound(path.to_string()))?;
        Ok(check.run(state).await)
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }
}

fn fold(path: &str, case_insensitive: bool) -> std::borrow::Cow<'_, str> {
    if case_insensitive {
        path.to_lowercase().into()
    } else {
        path.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_check() -> HealthCheck {
        HealthCheck::new(|_| async { Ok::<_, CheckError>(None) })
    }

    fn registry(case_insensitive: bool) -> HealthCheckRegistry {
        HealthCheckRegistry::new(
            [("/HeAlTh", ok_check())],
            RegistryOptions {
                case_insensitive,
                ..Default::default()
            },
        )
    }

    #[test]
    fn case_insensitive_matches_any_case() {
        let registry = registry(true);
        assert!(registry.resolve("/health").is_some());
        assert!(registry.resolve("/HEALTH").is_some());
        assert!(registry.resolve("/healthz").is_none());
    }

    #[test]
    fn case_sensitive_requires_exact_match() {
        let registry = registry(false);
        assert!(registry.resolve("/HeAlTh").is_some());
        assert!(registry.resolve("/health").is_none());
    }

    #[tokio::test]
    async fn execute_passes_shutdown_state() {
        let registry = HealthCheckRegistry::new(
            [(
                "/ready",
                HealthCheck::new(|state: ShutdownState| async move {
                    Ok::<_, CheckError>(Some(json!({ "draining": state.is_shutting_down() })))
                }),
            )],
            RegistryOptions::default(),
        );

        let state = ShutdownState::new();
        state.begin();
        let info = registry.execute("/ready", state).await.unwrap().unwrap();
        assert_eq!(info, Some(json!({ "draining": true })));
    }

    #[tokio::test]
    async fn execute_unknown_path_is_not_found() {
        let registry = registry(false);
        let err = registry
            .execute("/missing", ShutdownState::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(path) if path == "/missing"));
    }

    #[test]
    fn duplicate_folded_keys_keep_last() {
        let registry = HealthCheckRegistry::new(
            [("/health", ok_check()), ("/HEALTH", ok_check())],
            RegistryOptions {
                case_insensitive: true,
                ..Default::default()
            },
        );
        assert_eq!(registry.len(), 1);
    }
}

//! Decorating a server with health checks and graceful shutdown.
//!
//! ```text
//! Lameduck::builder()
//!     .config(..) / .health_check(..) / hooks
//!     .build()                         → validated Settings + registry
//!     .serve(listener, app)
//!         → HealthCheckLayer wraps app
//!         → net::serve (drainable)
//!         → ShutdownOrchestrator
//!         → SignalTraps → orchestrator.initiate_shutdown
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use nix::sys::signal::Signal;
use serde_json::Value;
use tower::{Layer, Service};

use crate::config::{validate_config, ConfigError, LameduckConfig, Settings};
use crate::error::{BoxError, CheckError, LameduckError};
use crate::health::{HealthCheck, HealthCheckLayer, HealthCheckRegistry, HealthContext, RegistryOptions};
use crate::lifecycle::{
    Hook, Hooks, OsProcess, ProcessControl, ShutdownOrchestrator, ShutdownState, SignalTraps,
    Termination,
};
use crate::net::{Listener, ServerHandle};
use crate::observability::Logger;

/// Builder for [`Lameduck`].
pub struct LameduckBuilder {
    config: LameduckConfig,
    checks: Vec<(String, HealthCheck)>,
    hooks: Hooks,
    on_sigterm: Option<Hook>,
    logger: Logger,
    process: Arc<dyn ProcessControl>,
}

impl Default for LameduckBuilder {
    fn default() -> Self {
        Self {
            config: LameduckConfig::default(),
            checks: Vec::new(),
            hooks: Hooks::default(),
            on_sigterm: None,
            logger: Logger::default(),
            process: Arc::new(OsProcess),
        }
    }
}

impl LameduckBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: LameduckConfig) -> Self {
        self.config = config;
        self
    }

    pub fn signal(mut self, name: impl Into<String>) -> Self {
        self.config.signal = name.into();
        self
    }

    pub fn signals<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.config.signals = names.into_iter().map(Into::into).collect();
        self
    }

    /// Drain timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.config.case_insensitive = enabled;
        self
    }

    pub fn verbatim(mut self, enabled: bool) -> Self {
        self.config.health.verbatim = enabled;
        self
    }

    /// Include error source chains in failure bodies. Not for public endpoints.
    pub fn unsafe_expose_stack_traces(mut self, enabled: bool) -> Self {
        self.config.health.unsafe_expose_stack_traces = enabled;
        self
    }

    pub fn send_failures_during_shutdown(mut self, enabled: bool) -> Self {
        self.config.send_failures_during_shutdown = enabled;
        self
    }

    /// Exit with code 0 instead of re-raising the signal.
    pub fn use_exit0(mut self, enabled: bool) -> Self {
        self.config.use_exit0 = enabled;
        self
    }

    /// Register a check for `path`.
    pub fn health_check<F, Fut, E>(mut self, path: impl Into<String>, check: F) -> Self
    where
        F: Fn(ShutdownState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, E>> + Send + 'static,
        E: Into<CheckError>,
    {
        self.checks.push((path.into(), HealthCheck::new(check)));
        self
    }

    pub fn before_shutdown<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.hooks.before_shutdown = Some(Hook::new(hook));
        self
    }

    pub fn on_signal<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.hooks.on_signal = Some(Hook::new(hook));
        self
    }

    /// Older name of `on_signal`. Ignored when `on_signal` is set.
    pub fn on_sigterm<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.on_sigterm = Some(Hook::new(hook));
        self
    }

    pub fn on_shutdown<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.hooks.on_shutdown = Some(Hook::new(hook));
        self
    }

    pub fn on_send_failure_during_shutdown<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.hooks.on_send_failure_during_shutdown = Some(Hook::new(hook));
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the process-termination backend.
    pub fn process(mut self, process: Arc<dyn ProcessControl>) -> Self {
        self.process = process;
        self
    }

    /// Validate the configuration.
    pub fn build(self) -> Result<Lameduck, LameduckError> {
        let settings = validate_config(&self.config).map_err(ConfigError::Validation)?;

        let mut hooks = self.hooks;
        if hooks.on_signal.is_none() {
            hooks.on_signal = self.on_sigterm;
        }

        let registry = HealthCheckRegistry::new(
            self.checks,
            RegistryOptions {
                case_insensitive: settings.case_insensitive,
                verbatim: settings.verbatim,
                expose_stack_traces: settings.expose_stack_traces,
            },
        );
        if registry.is_empty() {
            tracing::warn!("No health checks registered");
        } else {
            tracing::debug!(checks = registry.len(), "Health checks registered");
        }

        Ok(Lameduck {
            settings,
            registry,
            hooks,
            logger: self.logger,
            process: self.process,
            state: ShutdownState::new(),
        })
    }
}

/// A validated decorator, ready to wrap a server.
pub struct Lameduck {
    settings: Settings,
    registry: HealthCheckRegistry,
    hooks: Hooks,
    logger: Logger,
    process: Arc<dyn ProcessControl>,
    state: ShutdownState,
}

impl Lameduck {
    pub fn builder() -> LameduckBuilder {
        LameduckBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The shutdown state shared with health checks.
    pub fn state(&self) -> ShutdownState {
        self.state.clone()
    }

    /// The health check interceptor, for wrapping `app` by hand.
    pub fn layer(&self) -> HealthCheckLayer {
        HealthCheckLayer::new(HealthContext::new(
            self.registry.clone(),
            self.state.clone(),
            self.settings.responses.clone(),
            self.settings.send_failures_during_shutdown,
            self.hooks.on_send_failure_during_shutdown.clone(),
            self.logger.clone(),
        ))
    }

    /// Serve `app` on `listener` and trap the configured signals.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn serve<S>(self, listener: Listener, app: S) -> Result<Running, LameduckError>
    where
        S: Service<Request<Incoming>, Response = Response<Body>, Error = Infallible>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        let service = self.layer().layer(app);
        let server = Arc::new(crate::net::serve(
            listener,
            service,
            self.settings.drain_timeout,
        )?);

        let orchestrator = Arc::new(ShutdownOrchestrator::new(
            self.state,
            self.hooks,
            server.clone(),
            self.process,
            self.settings.exit_mode,
            self.logger,
        ));

        let handler = Arc::clone(&orchestrator);
        let traps = SignalTraps::install(&self.settings.signals, move |signal| {
            let orchestrator = Arc::clone(&handler);
            async move {
                orchestrator.initiate_shutdown(signal).await;
            }
        })?;
        orchestrator.attach_traps(traps);

        Ok(Running {
            server,
            orchestrator,
        })
    }
}

/// A decorated server that is accepting connections.
pub struct Running {
    server: Arc<ServerHandle>,
    orchestrator: Arc<ShutdownOrchestrator>,
}

impl Running {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn state(&self) -> &ShutdownState {
        self.orchestrator.state()
    }

    pub fn active_connections(&self) -> u64 {
        self.server.active_connections()
    }

    /// Run the shutdown sequence as if `signal` had been received.
    pub async fn shutdown(&self, signal: Signal) -> Termination {
        self.orchestrator.initiate_shutdown(signal).await
    }

    /// Wait for the shutdown sequence to finish.
    pub async fn wait(&self) -> Termination {
        self.orchestrator.wait().await
    }
}

//! Health check interception.
//!
//! # Request Flow
//! ```text
//! request
//!     → path resolved in registry?
//!         no  → inner service, untouched
//!         yes → shutting down && send_failures_during_shutdown?
//!                 yes → on_send_failure_during_shutdown() → failure response
//!                 no  → run check(state) → success | failure response
//! ```
//!
//! # Design Decisions
//! - Implemented as a tower `Layer` wrapping the whole application service
//! - A request takes exactly one of the two paths
//! - Check failures are always rendered, never returned as service errors

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::health::registry::HealthCheckRegistry;
use crate::health::response::{render_failure, render_success, HealthResponse, ResponseSettings};
use crate::lifecycle::{Hook, ShutdownState};
use crate::observability::{LogEvent, Logger};

/// Everything needed to answer a health request.
#[derive(Debug)]
pub struct HealthContext {
    registry: HealthCheckRegistry,
    state: ShutdownState,
    responses: ResponseSettings,
    send_failures_during_shutdown: bool,
    on_send_failure: Option<Hook>,
    logger: Logger,
}

impl HealthContext {
    pub fn new(
        registry: HealthCheckRegistry,
        state: ShutdownState,
        responses: ResponseSettings,
        send_failures_during_shutdown: bool,
        on_send_failure: Option<Hook>,
        logger: Logger,
    ) -> Self {
        Self {
            registry,
            state,
            responses,
            send_failures_during_shutdown,
            on_send_failure,
            logger,
        }
    }

    /// Answer a request for a registered health route.
    pub async fn respond(&self, path: &str) -> HealthResponse {
        let options = self.registry.options();

        if self.state.is_shutting_down() && self.send_failures_during_shutdown {
            tracing::debug!(path = %path, "Shutting down, failing health check");
            if let Some(hook) = &self.on_send_failure {
                if let Err(error) = hook.run().await {
                    self.logger.log(&LogEvent::SendFailureHookFailed {
                        path,
                        error: error.as_ref(),
                    });
                }
            }
            return render_failure(None, options.expose_stack_traces, &self.responses);
        }

        match self.registry.execute(path, self.state.clone()).await {
            Ok(Ok(info)) => render_success(info.as_ref(), options.verbatim, &self.responses),
            Ok(Err(error)) => {
                self.logger.log(&LogEvent::HealthCheckFailed {
                    path,
                    error: &error,
                });
                render_failure(Some(&error), options.expose_stack_traces, &self.responses)
            }
            Err(error) => {
                tracing::error!(path = %path, error = %error, "Health route has no check");
                render_failure(None, options.expose_stack_traces, &self.responses)
            }
        }
    }
}

/// Layer installing the health check interceptor in front of a service.
#[derive(Debug, Clone)]
pub struct HealthCheckLayer {
    ctx: Arc<HealthContext>,
}

impl HealthCheckLayer {
    pub fn new(ctx: HealthContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }
}

impl<S> Layer<S> for HealthCheckLayer {
    type Service = HealthCheckService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HealthCheckService {
            inner,
            ctx: Arc::clone(&self.ctx),
        }
    }
}

/// The replacement dispatch: health routes are answered here, everything
/// else goes to the wrapped service.
#[derive(Debug, Clone)]
pub struct HealthCheckService<S> {
    inner: S,
    ctx: Arc<HealthContext>,
}

impl<S, B> Service<Request<B>> for HealthCheckService<S>
where
    S: Service<Request<B>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if self.ctx.registry.resolve(req.uri().path()).is_none() {
            return Box::pin(self.inner.call(req));
        }

        let ctx = Arc::clone(&self.ctx);
        let path = req.uri().path().to_string();
        Box::pin(async move { Ok(ctx.respond(&path).await.into_response()) })
    }
}

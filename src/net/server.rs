//! Drainable HTTP server.
//!
//! # Responsibilities
//! - Accept TCP connections and serve HTTP/1.1 and HTTP/2 on each
//! - On `stop_accepting`: close the listener, ask every connection to finish
//!   its in-flight requests, force-close whatever is left at the deadline
//!
//! # Connection States
//! ```text
//! Accepted → Serving → (drain requested) Draining → Closed
//!                                          └── deadline → Aborted
//! ```
//!
//! # Design Decisions
//! - Each connection runs in a JoinSet owned by the accept loop, so stragglers
//!   can be aborted together
//! - Idle keep-alive connections close as soon as draining starts
//! - HTTP/2 stream tasks are aborted together with their connection
//! - Accept errors other than per-connection ones back off before retrying
//! - Dropping the handle stops the server

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper::rt::Executor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tower::Service;

use crate::error::DrainError;
use crate::lifecycle::Drain;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};

/// Pause after an accept error that is not specific to one connection,
/// such as running out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Outcome of draining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Connections open when the listener stopped accepting.
    pub in_flight: u64,
    /// Connections aborted at the drain deadline.
    pub forced: u64,
}

/// Handle to a running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<Option<DrainReport>>,
    tracker: ConnectionTracker,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of open connections.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Wait until the server has stopped and drained.
    pub async fn closed(&self) -> Result<DrainReport, DrainError> {
        let mut done = self.done_rx.clone();
        let report = *done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| DrainError::ServerGone)?;
        Ok(report.unwrap_or_default())
    }
}

#[async_trait]
impl Drain for ServerHandle {
    async fn stop_accepting(&self) -> Result<DrainReport, DrainError> {
        self.stop_tx.send_replace(true);
        self.closed().await
    }
}

/// Source of incoming connections.
#[async_trait]
trait Acceptor: Send + Sync + 'static {
    async fn accept(&self) -> Result<TcpStream, ListenerError>;
}

#[async_trait]
impl Acceptor for Listener {
    async fn accept(&self) -> Result<TcpStream, ListenerError> {
        Listener::accept(self).await.map(|(stream, _peer)| stream)
    }
}

/// Start serving `service` on `listener`.
///
/// Must be called from within a Tokio runtime.
pub fn serve<S>(
    listener: Listener,
    service: S,
    drain_timeout: Duration,
) -> Result<ServerHandle, ListenerError>
where
    S: Service<Request<Incoming>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let (done_tx, done_rx) = watch::channel(None);
    let tracker = ConnectionTracker::new();

    tokio::spawn(accept_loop(
        listener,
        service,
        drain_timeout,
        tracker.clone(),
        stop_rx,
        done_tx,
    ));

    tracing::info!(address = %local_addr, "HTTP server starting");
    Ok(ServerHandle {
        local_addr,
        stop_tx,
        done_rx,
        tracker,
    })
}

async fn accept_loop<A, S>(
    listener: A,
    service: S,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
    mut stop_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<Option<DrainReport>>,
) where
    A: Acceptor,
    S: Service<Request<Incoming>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let (drain_tx, drain_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = wait_until_set(&mut stop_rx) => break,
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    connections.spawn(serve_connection(
                        stream,
                        service.clone(),
                        drain_rx.clone(),
                        tracker.track(),
                    ));
                }
                Err(ListenerError::Accept(e)) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "Connection failed before accept");
                }
                Err(e) => {
                    tracing::warn!(error = %e, backoff = ?ACCEPT_ERROR_BACKOFF, "Accept failed");
                    tokio::select! {
                        _ = wait_until_set(&mut stop_rx) => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    tracing::warn!(error = %e, "Connection task failed");
                }
            }
        }
    }

    drop(listener);
    let in_flight = tracker.active_count();
    tracing::info!(in_flight, timeout = ?drain_timeout, "Stopped accepting, draining connections");
    drain_tx.send_replace(true);

    let drained = tokio::time::timeout(drain_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await
    .is_ok();

    let forced = if drained {
        0
    } else {
        let remaining = tracker.active_count();
        tracing::warn!(remaining, "Drain timeout elapsed, closing remaining connections");
        connections.shutdown().await;
        remaining
    };

    done_tx.send_replace(Some(DrainReport { in_flight, forced }));
    tracing::info!("HTTP server stopped");
}

async fn serve_connection<S>(
    stream: TcpStream,
    service: S,
    drain_rx: watch::Receiver<bool>,
    guard: ConnectionGuard,
) where
    S: Service<Request<Incoming>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    let streams = StreamExecutor::default();
    let _abort_streams = streams.abort_on_drop();
    let builder = auto::Builder::new(streams);
    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
    tokio::pin!(conn);

    let mut drain_rx = drain_rx;
    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = wait_until_set(&mut drain_rx) => {
            tracing::trace!(connection_id = guard.id(), "Draining connection");
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = guard.id(), error = %e, "Connection closed with error");
    }
}

/// Spawns the HTTP/2 stream tasks of one connection.
#[derive(Debug, Clone, Default)]
struct StreamExecutor {
    streams: Arc<Mutex<Vec<AbortHandle>>>,
}

impl StreamExecutor {
    fn abort_on_drop(&self) -> AbortStreams {
        AbortStreams(Arc::clone(&self.streams))
    }
}

impl<F> Executor<F> for StreamExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        let handle = tokio::spawn(fut).abort_handle();
        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        streams.retain(|stream| !stream.is_finished());
        streams.push(handle);
    }
}

/// Aborts the remaining stream tasks when the connection task ends.
struct AbortStreams(Arc<Mutex<Vec<AbortHandle>>>);

impl Drop for AbortStreams {
    fn drop(&mut self) {
        let streams = self.0.lock().unwrap_or_else(|e| e.into_inner());
        for stream in streams.iter() {
            stream.abort();
        }
    }
}

/// Errors that concern only the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Resolve once the flag is set, or once its sender is gone.
async fn wait_until_set(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

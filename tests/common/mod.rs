//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use lameduck::lifecycle::ProcessControl;
use lameduck::{LameduckBuilder, Listener, Running};
use nix::sys::signal::Signal;

/// Records exits and re-raises instead of terminating the test process.
#[derive(Debug, Default)]
pub struct RecordingProcess {
    exits: Mutex<Vec<i32>>,
    reraised: Mutex<Vec<Signal>>,
}

#[allow(dead_code)]
impl RecordingProcess {
    pub fn exits(&self) -> Vec<i32> {
        self.exits.lock().unwrap().clone()
    }

    pub fn reraised(&self) -> Vec<Signal> {
        self.reraised.lock().unwrap().clone()
    }
}

impl ProcessControl for RecordingProcess {
    fn exit(&self, code: i32) {
        self.exits.lock().unwrap().push(code);
    }

    fn reraise(&self, signal: Signal) {
        self.reraised.lock().unwrap().push(signal);
    }
}

/// Application behind the decorator.
pub fn app() -> Router {
    Router::new()
        .route("/", get(|| async { "hello" }))
        .route("/health", get(|| async { "app health" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "done"
            }),
        )
        .route(
            "/hang",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "never"
            }),
        )
}

/// Bind an ephemeral port.
#[allow(dead_code)]
pub async fn bind() -> (Listener, SocketAddr) {
    let listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Build, serve and return the running server with its recorded process.
#[allow(dead_code)]
pub async fn start(builder: LameduckBuilder) -> (Running, Arc<RecordingProcess>) {
    let (listener, _) = bind().await;
    start_on(listener, builder)
}

/// Like `start`, for a listener bound ahead of time.
#[allow(dead_code)]
pub fn start_on(listener: Listener, builder: LameduckBuilder) -> (Running, Arc<RecordingProcess>) {
    let process = Arc::new(RecordingProcess::default());
    let running = builder
        .process(process.clone())
        .build()
        .unwrap()
        .serve(listener, app())
        .unwrap();
    (running, process)
}

#[allow(dead_code)]
pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

/// Client that does not reuse connections between requests.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

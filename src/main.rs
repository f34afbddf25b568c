//! lameduck demo server
//!
//! Serves a small axum application decorated with health checks and
//! graceful shutdown.
//!
//! ```text
//!     Client Request
//!     ──────▶ Listener ──▶ HealthCheckLayer ──┬──▶ /health, /ready  (checks)
//!                                             └──▶ axum Router      (application)
//!
//!     SIGTERM ──▶ fail health checks ──▶ drain ──▶ hooks ──▶ re-raise
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use clap::Parser;
use serde_json::json;
use tower_http::trace::TraceLayer;

use lameduck::config::{load_config, LameduckConfig};
use lameduck::observability::init_logging;
use lameduck::{CheckError, Lameduck, Listener, ShutdownState};

#[derive(Parser)]
#[command(name = "lameduck")]
#[command(about = "Demo server with health checks and graceful shutdown", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?.0,
        None => LameduckConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.logging)?;
    tracing::info!("lameduck v{} starting", env!("CARGO_PKG_VERSION"));

    let started = Instant::now();
    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "done"
            }),
        )
        .layer(TraceLayer::new_for_http());

    let bind_address = config.listener.bind_address.clone();
    let lameduck = Lameduck::builder()
        .config(config)
        .health_check("/health", move |_| async move {
            Ok::<_, CheckError>(Some(json!({ "uptime_secs": started.elapsed().as_secs() })))
        })
        .health_check("/ready", |state: ShutdownState| async move {
            if state.is_shutting_down() {
                return Err(CheckError::msg("shutting down"));
            }
            Ok(None::<serde_json::Value>)
        })
        .before_shutdown(|| async {
            tracing::info!("Waiting for load balancers to notice");
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, std::io::Error>(())
        })
        .on_signal(|| async {
            tracing::info!("Releasing resources");
            Ok::<_, std::io::Error>(())
        })
        .on_shutdown(|| async {
            tracing::info!("Cleanup finished");
            Ok::<_, std::io::Error>(())
        })
        .build()?;

    let listener = Listener::bind(&bind_address).await?;
    let running = lameduck.serve(listener, app)?;
    tracing::info!(address = %running.local_addr(), "Listening for connections");

    let termination = running.wait().await;
    tracing::info!(?termination, "Shutdown complete");
    Ok(())
}

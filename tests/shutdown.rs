//! Graceful shutdown over real connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lameduck::error::BoxError;
use lameduck::observability::{LogEvent, Logger};
use lameduck::{CheckError, Lameduck, ShutdownState, Termination};
use nix::sys::signal::Signal;
use serde_json::{json, Value};
use tokio::sync::mpsc;

mod common;

type Calls = Arc<Mutex<Vec<String>>>;

fn recorder(calls: &Calls, name: &'static str) -> impl Fn() -> std::future::Ready<Result<(), BoxError>> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move || {
        calls.lock().unwrap().push(name.to_string());
        std::future::ready(Ok(()))
    }
}

#[tokio::test]
async fn test_in_flight_request_completes_during_drain() {
    let (running, process) =
        common::start(Lameduck::builder().timeout(Duration::from_secs(5))).await;
    let url = common::url(running.local_addr(), "/slow");

    let request = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let termination = running.shutdown(Signal::SIGTERM).await;

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "done");
    assert_eq!(termination, Termination::Reraised(Signal::SIGTERM));
    assert_eq!(process.reraised(), vec![Signal::SIGTERM]);
    assert!(process.exits().is_empty());
}

#[tokio::test]
async fn test_stragglers_are_closed_at_the_timeout() {
    let (running, process) =
        common::start(Lameduck::builder().timeout(Duration::from_millis(200))).await;
    let url = common::url(running.local_addr(), "/hang");

    let request = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(running.active_connections(), 1);

    let started = Instant::now();
    running.shutdown(Signal::SIGTERM).await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(request.await.unwrap().is_err());
    assert_eq!(running.active_connections(), 0);
    assert_eq!(process.reraised(), vec![Signal::SIGTERM]);
}

#[tokio::test]
async fn test_new_connections_refused_after_shutdown() {
    let (running, _) = common::start(Lameduck::builder()).await;
    let addr = running.local_addr();

    running.shutdown(Signal::SIGTERM).await;

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_hooks_run_in_order() {
    let calls: Calls = Arc::default();
    let (running, _) = common::start(
        Lameduck::builder()
            .before_shutdown(recorder(&calls, "before_shutdown"))
            .on_signal(recorder(&calls, "on_signal"))
            .on_shutdown(recorder(&calls, "on_shutdown")),
    )
    .await;

    running.shutdown(Signal::SIGINT).await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["before_shutdown", "on_signal", "on_shutdown"]
    );
}

#[tokio::test]
async fn test_legacy_on_sigterm_runs_when_on_signal_unset() {
    let calls: Calls = Arc::default();
    let (running, _) =
        common::start(Lameduck::builder().on_sigterm(recorder(&calls, "on_sigterm"))).await;

    running.shutdown(Signal::SIGTERM).await;

    assert_eq!(*calls.lock().unwrap(), vec!["on_sigterm"]);
}

#[tokio::test]
async fn test_on_signal_takes_precedence_over_on_sigterm() {
    let calls: Calls = Arc::default();
    let (running, _) = common::start(
        Lameduck::builder()
            .on_sigterm(recorder(&calls, "on_sigterm"))
            .on_signal(recorder(&calls, "on_signal")),
    )
    .await;

    running.shutdown(Signal::SIGTERM).await;

    assert_eq!(*calls.lock().unwrap(), vec!["on_signal"]);
}

#[tokio::test]
async fn test_use_exit0_exits_cleanly() {
    let (running, process) = common::start(Lameduck::builder().use_exit0(true)).await;

    assert_eq!(running.shutdown(Signal::SIGTERM).await, Termination::Exited(0));
    assert_eq!(process.exits(), vec![0]);
    assert!(process.reraised().is_empty());
}

#[tokio::test]
async fn test_hook_failure_exits_with_one() {
    let calls: Calls = Arc::default();
    let logged = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&logged);
    let (running, process) = common::start(
        Lameduck::builder()
            .on_signal(|| async { Err::<(), _>(std::io::Error::other("flush failed")) })
            .on_shutdown(recorder(&calls, "on_shutdown"))
            .logger(Logger::new(move |event| {
                if let LogEvent::ShutdownFailed { error } = event {
                    sink.lock().unwrap().push(error.to_string());
                }
            })),
    )
    .await;

    assert_eq!(running.shutdown(Signal::SIGTERM).await, Termination::Exited(1));
    assert_eq!(process.exits(), vec![1]);
    assert!(process.reraised().is_empty());
    assert!(calls.lock().unwrap().is_empty());

    let logged = logged.lock().unwrap();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].contains("flush failed"));
}

#[tokio::test]
async fn test_second_shutdown_is_ignored() {
    let runs = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&runs);
    let (running, process) = common::start(Lameduck::builder().on_shutdown(move || {
        count.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, BoxError>(()) }
    }))
    .await;

    let (first, second) = tokio::join!(
        running.shutdown(Signal::SIGTERM),
        running.shutdown(Signal::SIGINT)
    );

    assert_eq!(first, Termination::Reraised(Signal::SIGTERM));
    assert_eq!(second, Termination::AlreadyShuttingDown);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(process.reraised(), vec![Signal::SIGTERM]);
    assert_eq!(running.wait().await, Termination::Reraised(Signal::SIGTERM));
}

/// Probes `/ready` from inside `before_shutdown`, while the listener still accepts.
async fn probe_during_before_shutdown(
    send_failures: bool,
    hook_runs: Arc<AtomicUsize>,
) -> (u16, Value) {
    let (listener, addr) = common::bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (running, _) = common::start_on(
        listener,
        Lameduck::builder()
            .send_failures_during_shutdown(send_failures)
            .verbatim(true)
            .health_check("/ready", |state: ShutdownState| async move {
                Ok::<_, CheckError>(Some(json!({"draining": state.is_shutting_down()})))
            })
            .on_send_failure_during_shutdown(move || {
                hook_runs.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(()) }
            })
            .before_shutdown(move || {
                let tx = tx.clone();
                async move {
                    let res = common::client()
                        .get(common::url(addr, "/ready"))
                        .send()
                        .await?;
                    let status = res.status().as_u16();
                    let body: Value = res.json().await?;
                    let _ = tx.send((status, body));
                    Ok::<_, BoxError>(())
                }
            }),
    );

    running.shutdown(Signal::SIGTERM).await;
    rx.recv().await.unwrap()
}

#[tokio::test]
async fn test_health_fails_once_shutdown_begins() {
    let hook_runs = Arc::new(AtomicUsize::new(0));
    let (status, body) = probe_during_before_shutdown(true, Arc::clone(&hook_runs)).await;

    assert_eq!(status, 503);
    assert_eq!(body, json!({"status": "error"}));
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_checks_keep_running_when_failures_disabled() {
    let hook_runs = Arc::new(AtomicUsize::new(0));
    let (status, body) = probe_during_before_shutdown(false, Arc::clone(&hook_runs)).await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "ok", "draining": true}));
    assert_eq!(hook_runs.load(Ordering::SeqCst), 0);
}

//! Shutdown orchestration.
//!
//! # Sequence
//! ```text
//! initiate_shutdown(signal)            (first call only)
//!     → ShutdownState: Running → ShuttingDown
//!     → before_shutdown()
//!     → Drain::stop_accepting()        (bounded by the drain timeout)
//!     → on_signal()
//!     → on_shutdown()
//!     → exit(0) | remove traps + re-raise signal
//!
//! Any phase error:
//!     → Logger(ShutdownFailed) → exit(1)
//! ```
//!
//! # Design Decisions
//! - Idempotency is enforced by the state transition at entry
//! - Phases run strictly one after another, never overlapping
//! - No retries; the first failure ends the sequence

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use nix::sys::signal::Signal;
use tokio::sync::watch;

use crate::error::{BoxError, DrainError, Phase, ShutdownError};
use crate::lifecycle::process::ProcessControl;
use crate::lifecycle::signals::SignalTraps;
use crate::lifecycle::state::ShutdownState;
use crate::net::server::DrainReport;
use crate::observability::{LogEvent, Logger};

/// A listener that can stop accepting and drain its connections.
#[async_trait]
pub trait Drain: Send + Sync {
    /// Stop admitting connections, wait for in-flight ones, force-close
    /// stragglers once the drain timeout elapses.
    async fn stop_accepting(&self) -> Result<DrainReport, DrainError>;
}

/// An async lifecycle callback.
#[derive(Clone)]
pub struct Hook(Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>);

impl Hook {
    pub fn new<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self(Arc::new(move || {
            f().map(|r| r.map_err(Into::<BoxError>::into)).boxed()
        }))
    }

    pub async fn run(&self) -> Result<(), BoxError> {
        (self.0)().await
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook")
    }
}

/// Lifecycle hooks. Unset hooks are no-ops.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    pub before_shutdown: Option<Hook>,
    pub on_signal: Option<Hook>,
    pub on_shutdown: Option<Hook>,
    pub on_send_failure_during_shutdown: Option<Hook>,
}

/// How a clean shutdown ends the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitMode {
    /// Remove the traps and re-raise the received signal.
    Reraise,
    /// Exit with code 0.
    ExitZero,
}

/// What `initiate_shutdown` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Shutdown was already underway; nothing happened.
    AlreadyShuttingDown,
    /// The process was told to exit with this code.
    Exited(i32),
    /// The signal was re-delivered with its default disposition.
    Reraised(Signal),
}

/// The exactly-once shutdown state machine.
pub struct ShutdownOrchestrator {
    state: ShutdownState,
    hooks: Hooks,
    drain: Arc<dyn Drain>,
    process: Arc<dyn ProcessControl>,
    exit_mode: ExitMode,
    logger: Logger,
    traps: Mutex<Option<SignalTraps>>,
    outcome: watch::Sender<Option<Termination>>,
}

impl ShutdownOrchestrator {
    pub fn new(
        state: ShutdownState,
        hooks: Hooks,
        drain: Arc<dyn Drain>,
        process: Arc<dyn ProcessControl>,
        exit_mode: ExitMode,
        logger: Logger,
    ) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            state,
            hooks,
            drain,
            process,
            exit_mode,
            logger,
            traps: Mutex::new(None),
            outcome,
        }
    }

    /// Hand over the signal traps to remove before re-raising.
    pub fn attach_traps(&self, traps: SignalTraps) {
        let mut slot = self.traps.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(traps);
    }

    pub fn state(&self) -> &ShutdownState {
        &self.state
    }

    /// Run the shutdown sequence. Only the first call has any effect.
    pub async fn initiate_shutdown(&self, signal: Signal) -> Termination {
        if !self.state.begin() {
            tracing::debug!(signal = %signal, "Shutdown already in progress, ignoring");
            return Termination::AlreadyShuttingDown;
        }
        tracing::info!(signal = %signal, "Starting graceful shutdown");

        let termination = match self.run_phases().await {
            Ok(()) => self.terminate(signal),
            Err(error) => {
                self.logger.log(&LogEvent::ShutdownFailed { error: &error });
                self.process.exit(1);
                Termination::Exited(1)
            }
        };
        self.outcome.send_replace(Some(termination));
        termination
    }

    /// Wait for the first shutdown sequence to finish.
    pub async fn wait(&self) -> Termination {
        let mut rx = self.outcome.subscribe();
        let termination = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(Termination::AlreadyShuttingDown),
            // The sender lives in `self`.
            Err(_) => Termination::AlreadyShuttingDown,
        };
        termination
    }

    async fn run_phases(&self) -> Result<(), ShutdownError> {
        run_hook(Phase::BeforeShutdown, self.hooks.before_shutdown.as_ref()).await?;

        tracing::debug!(phase = %Phase::Drain, "Stopping listener");
        let report = self.drain.stop_accepting().await?;
        tracing::info!(
            in_flight = report.in_flight,
            forced = report.forced,
            "Connections drained"
        );

        run_hook(Phase::OnSignal, self.hooks.on_signal.as_ref()).await?;
        run_hook(Phase::OnShutdown, self.hooks.on_shutdown.as_ref()).await?;
        Ok(())
    }

    fn terminate(&self, signal: Signal) -> Termination {
        match self.exit_mode {
            ExitMode::ExitZero => {
                tracing::info!("Shutdown complete, exiting");
                self.process.exit(0);
                Termination::Exited(0)
            }
            ExitMode::Reraise => {
                let traps = self.traps.lock().unwrap_or_else(|e| e.into_inner()).take();
                if let Some(traps) = traps {
                    traps.remove();
                }
                tracing::info!(signal = %signal, "Shutdown complete, re-raising signal");
                self.process.reraise(signal);
                Termination::Reraised(signal)
            }
        }
    }
}

async fn run_hook(phase: Phase, hook: Option<&Hook>) -> Result<(), ShutdownError> {
    let Some(hook) = hook else {
        return Ok(());
    };
    tracing::debug!(phase = %phase, "Running shutdown hook");
    hook.run()
        .await
        .map_err(|source| ShutdownError::Hook { phase, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingProcess {
        exits: Mutex<Vec<i32>>,
        reraised: Mutex<Vec<Signal>>,
    }

    impl ProcessControl for RecordingProcess {
        fn exit(&self, code: i32) {
            self.exits.lock().unwrap().push(code);
        }

        fn reraise(&self, signal: Signal) {
            self.reraised.lock().unwrap().push(signal);
        }
    }

    struct FakeDrain {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Drain for FakeDrain {
        async fn stop_accepting(&self) -> Result<DrainReport, DrainError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.calls.lock().unwrap().push("drain");
            if self.fail {
                Err(DrainError::ServerGone)
            } else {
                Ok(DrainReport::default())
            }
        }
    }

    fn recording_hook(calls: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Hook {
        let calls = Arc::clone(calls);
        Hook::new(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().unwrap().push(name);
                Ok::<_, BoxError>(())
            }
        })
    }

    fn orchestrator(
        hooks: Hooks,
        calls: &Arc<Mutex<Vec<&'static str>>>,
        fail_drain: bool,
        exit_mode: ExitMode,
    ) -> (Arc<ShutdownOrchestrator>, Arc<RecordingProcess>) {
        let process = Arc::new(RecordingProcess::default());
        let drain = Arc::new(FakeDrain {
            calls: Arc::clone(calls),
            fail: fail_drain,
        });
        let orchestrator = ShutdownOrchestrator::new(
            ShutdownState::new(),
            hooks,
            drain,
            process.clone(),
            exit_mode,
            Logger::default(),
        );
        (Arc::new(orchestrator), process)
    }

    fn all_hooks(calls: &Arc<Mutex<Vec<&'static str>>>) -> Hooks {
        Hooks {
            before_shutdown: Some(recording_hook(calls, "before_shutdown")),
            on_signal: Some(recording_hook(calls, "on_signal")),
            on_shutdown: Some(recording_hook(calls, "on_shutdown")),
            on_send_failure_during_shutdown: None,
        }
    }

    #[tokio::test]
    async fn runs_phases_in_order_then_reraises() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (orch, process) = orchestrator(all_hooks(&calls), &calls, false, ExitMode::Reraise);

        let termination = orch.initiate_shutdown(Signal::SIGTERM).await;

        assert_eq!(termination, Termination::Reraised(Signal::SIGTERM));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["before_shutdown", "drain", "on_signal", "on_shutdown"]
        );
        assert_eq!(*process.reraised.lock().unwrap(), vec![Signal::SIGTERM]);
        assert!(process.exits.lock().unwrap().is_empty());
        assert!(orch.state().is_shutting_down());
    }

    #[tokio::test]
    async fn exit_zero_mode_exits_cleanly() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (orch, process) = orchestrator(Hooks::default(), &calls, false, ExitMode::ExitZero);

        assert_eq!(
            orch.initiate_shutdown(Signal::SIGINT).await,
            Termination::Exited(0)
        );
        assert_eq!(*process.exits.lock().unwrap(), vec![0]);
        assert!(process.reraised.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_triggers_run_hooks_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&counter);
        let hooks = Hooks {
            on_signal: Some(Hook::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(()) }
            })),
            ..Default::default()
        };
        let (orch, process) = orchestrator(hooks, &calls, false, ExitMode::Reraise);

        let signals = [
            Signal::SIGTERM,
            Signal::SIGINT,
            Signal::SIGTERM,
            Signal::SIGUSR2,
        ];
        let tasks: Vec<_> = signals
            .into_iter()
            .map(|signal| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move { orch.initiate_shutdown(signal).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|t| **t == Termination::AlreadyShuttingDown)
                .count(),
            3
        );
        assert_eq!(process.reraised.lock().unwrap().len(), 1);
        assert_eq!(*calls.lock().unwrap(), vec!["drain"]);
    }

    #[tokio::test]
    async fn first_signal_is_the_one_reraised() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (orch, process) = orchestrator(Hooks::default(), &calls, false, ExitMode::Reraise);

        let first = orch.initiate_shutdown(Signal::SIGUSR2);
        let second = orch.initiate_shutdown(Signal::SIGINT);
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, Termination::Reraised(Signal::SIGUSR2));
        assert_eq!(second, Termination::AlreadyShuttingDown);
        assert_eq!(*process.reraised.lock().unwrap(), vec![Signal::SIGUSR2]);
    }

    #[tokio::test]
    async fn hook_failure_short_circuits_and_exits_one() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = all_hooks(&calls);
        hooks.before_shutdown = Some(Hook::new(|| async {
            Err::<(), BoxError>("database still busy".into())
        }));
        let logged = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&logged);
        let (orch, process) = {
            let process = Arc::new(RecordingProcess::default());
            let drain = Arc::new(FakeDrain {
                calls: Arc::clone(&calls),
                fail: false,
            });
            let orch = ShutdownOrchestrator::new(
                ShutdownState::new(),
                hooks,
                drain,
                process.clone(),
                ExitMode::Reraise,
                Logger::new(move |event| {
                    if let LogEvent::ShutdownFailed { error } = event {
                        sink.lock().unwrap().push(error.phase());
                    }
                }),
            );
            (orch, process)
        };

        assert_eq!(
            orch.initiate_shutdown(Signal::SIGTERM).await,
            Termination::Exited(1)
        );
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(*process.exits.lock().unwrap(), vec![1]);
        assert!(process.reraised.lock().unwrap().is_empty());
        assert_eq!(*logged.lock().unwrap(), vec![Phase::BeforeShutdown]);
    }

    #[tokio::test]
    async fn drain_failure_skips_remaining_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (orch, process) = orchestrator(all_hooks(&calls), &calls, true, ExitMode::ExitZero);

        assert_eq!(
            orch.initiate_shutdown(Signal::SIGTERM).await,
            Termination::Exited(1)
        );
        assert_eq!(*calls.lock().unwrap(), vec!["before_shutdown", "drain"]);
        assert_eq!(*process.exits.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn wait_reports_outcome() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (orch, _process) = orchestrator(Hooks::default(), &calls, false, ExitMode::ExitZero);

        let waiter = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.wait().await })
        };
        orch.initiate_shutdown(Signal::SIGTERM).await;

        assert_eq!(waiter.await.unwrap(), Termination::Exited(0));
    }
}

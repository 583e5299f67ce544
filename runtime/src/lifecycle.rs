//! Starting, supervising and stopping the background loops.
//!
//! The [`LifecycleCoordinator`] owns the shared [`StopSignal`], every spawned
//! task handle and the cleanup steps for centrally owned resources. It moves
//! through a small state machine:
//!
//! ```text
//! Idle ──run()──► Running ──stop()──► Stopping ──► Stopped
//!   └───────────────stop()──────────────────────────┘
//! ```
//!
//! # Shutdown
//!
//! [`stop`](LifecycleCoordinator::stop) always runs in the same order:
//!
//! 1. set the stop signal
//! 2. join every started task, each with the same bounded timeout; a task
//!    that does not exit in time is abandoned
//! 3. run cleanup steps in registration order
//!
//! `stop` never fails. Calling it again re-runs only the cleanup steps that
//! have not yet succeeded, so a resource is released at most once.
//!
//! # Supervision
//!
//! Each task runs inside a small supervisor. When a task returns
//! [`TaskExit::Failed`] (or panics) before the stop signal is set, its
//! [`RestartPolicy`] decides whether it is started again.

use crate::metrics::LifecycleMetrics;
use futures::FutureExt;
use showrunner_core::StopSignal;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Default bound on each per-task join during shutdown.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `run` was called twice.
    #[error("Background tasks are already running")]
    AlreadyRunning,

    /// `run` was called after `stop`.
    #[error("Coordinator has been stopped")]
    AlreadyStopped,
}

/// A cleanup step failed; it will be retried on the next `stop`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cleanup failed: {0}")]
pub struct CleanupError(pub String);

/// How a task's `run` future ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// Returned because the stop signal was observed.
    Stopped,
    /// Gave up on its own.
    Failed(String),
}

/// What the supervisor does when a task fails before shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Leave it stopped.
    Never,
    /// Start it again after the delay.
    After(Duration),
}

/// A loop driven by the coordinator.
pub trait BackgroundTask: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Runs until `stop` is set or the task gives up.
    ///
    /// Must observe `stop` at least once a second.
    fn run(&self, stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>>;

    /// Restart behaviour after [`TaskExit::Failed`].
    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::Never
    }
}

/// Releases a resource once every task has been joined.
pub trait Cleanup: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Performs the cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError`]; the step is retried on the next `stop`.
    fn cleanup(&self) -> Pin<Box<dyn Future<Output = Result<(), CleanupError>> + Send + '_>>;
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Tasks registered, nothing spawned.
    Idle,
    /// Tasks spawned.
    Running,
    /// `stop` in progress.
    Stopping,
    /// `stop` finished.
    Stopped,
}

/// What one call to `stop` observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Whether this call set the stop signal.
    pub signalled: bool,
    /// Tasks that exited within the timeout.
    pub joined: Vec<String>,
    /// Tasks that panicked or were cancelled.
    pub failed: Vec<String>,
    /// Tasks abandoned after the timeout.
    pub timed_out: Vec<String>,
    /// Cleanup steps that succeeded during this call.
    pub cleaned: Vec<String>,
    /// Cleanup steps that failed during this call.
    pub cleanup_failures: Vec<String>,
}

struct RunningTask {
    name: String,
    handle: JoinHandle<()>,
}

struct CleanupStep {
    step: Arc<dyn Cleanup>,
    done: bool,
}

/// Owns the stop signal, the task handles and the cleanup steps.
pub struct LifecycleCoordinator {
    stop: StopSignal,
    join_timeout: Duration,
    state: LifecycleState,
    pending: Vec<Arc<dyn BackgroundTask>>,
    running: Vec<RunningTask>,
    cleanups: Vec<CleanupStep>,
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("state", &self.state)
            .field("join_timeout", &self.join_timeout)
            .field("pending", &self.pending.len())
            .field("running", &self.running.len())
            .field("cleanups", &self.cleanups.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleCoordinator {
    /// Creates an idle coordinator with the given per-task join timeout.
    #[must_use]
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            stop: StopSignal::new(),
            join_timeout,
            state: LifecycleState::Idle,
            pending: Vec::new(),
            running: Vec::new(),
            cleanups: Vec::new(),
        }
    }

    /// A handle on the shared stop signal.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Number of spawned tasks not yet joined.
    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.running.len()
    }

    /// Adds a task. It is spawned by `run`, or right away if already running.
    ///
    /// Tasks registered after `stop` are ignored.
    pub fn register(&mut self, task: Arc<dyn BackgroundTask>) {
        match self.state {
            LifecycleState::Idle => self.pending.push(task),
            LifecycleState::Running => self.spawn(task),
            LifecycleState::Stopping | LifecycleState::Stopped => {
                tracing::warn!(task = task.name(), "Ignoring task registered after stop");
            },
        }
    }

    /// Adds a cleanup step, run after all tasks are joined.
    pub fn register_cleanup(&mut self, step: Arc<dyn Cleanup>) {
        self.cleanups.push(CleanupStep { step, done: false });
    }

    /// Spawns every registered task and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if already running or stopped.
    pub fn run(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Idle => {},
            LifecycleState::Running => return Err(LifecycleError::AlreadyRunning),
            LifecycleState::Stopping | LifecycleState::Stopped => {
                return Err(LifecycleError::AlreadyStopped);
            },
        }

        self.state = LifecycleState::Running;
        let tasks = std::mem::take(&mut self.pending);
        tracing::info!(tasks = tasks.len(), "Starting background tasks");
        for task in tasks {
            self.spawn(task);
        }
        Ok(())
    }

    fn spawn(&mut self, task: Arc<dyn BackgroundTask>) {
        let name = task.name().to_string();
        let handle = tokio::spawn(supervise(task, self.stop.clone()));
        tracing::debug!(task = %name, "Task spawned");
        self.running.push(RunningTask { name, handle });
    }

    /// Signals, joins and cleans up. Never fails; see the module docs.
    pub async fn stop(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport {
            signalled: self.stop.trigger(),
            ..ShutdownReport::default()
        };
        if report.signalled {
            tracing::info!("Stop signal set, shutting down");
        } else {
            tracing::info!("Stop already requested, retrying outstanding shutdown steps");
        }

        self.state = LifecycleState::Stopping;
        self.pending.clear();

        for RunningTask { name, handle } in self.running.drain(..) {
            match tokio::time::timeout(self.join_timeout, handle).await {
                Ok(Ok(())) => {
                    tracing::info!(task = %name, "Task stopped");
                    report.joined.push(name);
                },
                Ok(Err(e)) => {
                    tracing::warn!(task = %name, error = %e, "Task ended abnormally");
                    report.failed.push(name);
                },
                Err(_) => {
                    LifecycleMetrics::record_join_timeout();
                    tracing::warn!(
                        task = %name,
                        timeout_ms = self.join_timeout.as_millis(),
                        "Task did not stop in time, abandoning it"
                    );
                    report.timed_out.push(name);
                },
            }
        }

        for entry in self.cleanups.iter_mut().filter(|entry| !entry.done) {
            let name = entry.step.name().to_string();
            match entry.step.cleanup().await {
                Ok(()) => {
                    entry.done = true;
                    tracing::info!(step = %name, "Cleanup complete");
                    report.cleaned.push(name);
                },
                Err(e) => {
                    tracing::error!(step = %name, error = %e, "Cleanup failed");
                    report.cleanup_failures.push(name);
                },
            }
        }

        self.state = LifecycleState::Stopped;
        tracing::info!(
            joined = report.joined.len(),
            timed_out = report.timed_out.len(),
            cleanup_failures = report.cleanup_failures.len(),
            "Shutdown complete"
        );
        report
    }
}

async fn supervise(task: Arc<dyn BackgroundTask>, stop: StopSignal) {
    loop {
        let exit = AssertUnwindSafe(task.run(stop.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| TaskExit::Failed("task panicked".to_string()));

        if stop.is_set() {
            return;
        }

        match (exit, task.restart_policy()) {
            (TaskExit::Stopped, _) => {
                tracing::debug!(task = task.name(), "Task returned before stop");
                return;
            },
            (TaskExit::Failed(reason), RestartPolicy::Never) => {
                tracing::error!(task = task.name(), reason = %reason, "Task failed");
                return;
            },
            (TaskExit::Failed(reason), RestartPolicy::After(delay)) => {
                tracing::warn!(
                    task = task.name(),
                    reason = %reason,
                    delay_ms = delay.as_millis(),
                    "Task failed, restarting"
                );
                if stop.sleep(delay).await {
                    return;
                }
                LifecycleMetrics::record_restart(task.name());
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    struct Ticker {
        ticks: Arc<AtomicUsize>,
    }

    impl BackgroundTask for Ticker {
        fn name(&self) -> &str {
            "ticker"
        }

        fn run(&self, stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>> {
            Box::pin(async move {
                while !stop.sleep(Duration::from_millis(5)).await {
                    self.ticks.fetch_add(1, Ordering::SeqCst);
                }
                TaskExit::Stopped
            })
        }
    }

    struct Stubborn;

    impl BackgroundTask for Stubborn {
        fn name(&self) -> &str {
            "stubborn"
        }

        fn run(&self, _stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                TaskExit::Stopped
            })
        }
    }

    struct Flaky {
        runs: Arc<AtomicUsize>,
    }

    impl BackgroundTask for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn run(&self, stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>> {
            Box::pin(async move {
                if self.runs.fetch_add(1, Ordering::SeqCst) < 2 {
                    return TaskExit::Failed("subscription lost".to_string());
                }
                stop.triggered().await;
                TaskExit::Stopped
            })
        }

        fn restart_policy(&self) -> RestartPolicy {
            RestartPolicy::After(Duration::from_millis(5))
        }
    }

    struct CountingCleanup {
        calls: Arc<AtomicUsize>,
        fail_first: AtomicBool,
    }

    impl Cleanup for CountingCleanup {
        fn name(&self) -> &str {
            "counting"
        }

        fn cleanup(&self) -> Pin<Box<dyn Future<Output = Result<(), CleanupError>> + Send + '_>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_first.swap(false, Ordering::SeqCst) {
                    Err(CleanupError("pool busy".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn cleanup(fail_first: bool) -> (Arc<CountingCleanup>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let step = Arc::new(CountingCleanup {
            calls: Arc::clone(&calls),
            fail_first: AtomicBool::new(fail_first),
        });
        (step, calls)
    }

    #[tokio::test]
    async fn run_then_stop_joins_and_cleans_up_once() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let (step, calls) = cleanup(false);
        let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(1));
        coordinator.register(Arc::new(Ticker {
            ticks: Arc::clone(&ticks),
        }));
        coordinator.register_cleanup(step);

        coordinator.run().unwrap();
        assert_eq!(coordinator.state(), LifecycleState::Running);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let report = coordinator.stop().await;

        assert!(report.signalled);
        assert_eq!(report.joined, vec!["ticker".to_string()]);
        assert!(report.timed_out.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ticks.load(Ordering::SeqCst) > 0);
        assert_eq!(coordinator.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn second_stop_does_not_repeat_successful_cleanup() {
        let (step, calls) = cleanup(false);
        let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(1));
        coordinator.register_cleanup(step);
        coordinator.run().unwrap();

        let first = coordinator.stop().await;
        let second = coordinator.stop().await;

        assert!(first.signalled);
        assert!(!second.signalled);
        assert!(second.cleaned.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_stop_retries_failed_cleanup() {
        let (step, calls) = cleanup(true);
        let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(1));
        coordinator.register_cleanup(step);

        let first = coordinator.stop().await;
        let second = coordinator.stop().await;

        assert_eq!(first.cleanup_failures, vec!["counting".to_string()]);
        assert_eq!(second.cleaned, vec!["counting".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_before_run_is_harmless_and_blocks_later_runs() {
        let mut coordinator = LifecycleCoordinator::new(Duration::from_millis(100));
        coordinator.register(Arc::new(Ticker {
            ticks: Arc::new(AtomicUsize::new(0)),
        }));

        let report = coordinator.stop().await;

        assert!(report.joined.is_empty());
        assert_eq!(coordinator.run(), Err(LifecycleError::AlreadyStopped));
        assert_eq!(coordinator.running_tasks(), 0);
    }

    #[tokio::test]
    async fn run_twice_is_rejected() {
        let mut coordinator = LifecycleCoordinator::new(Duration::from_millis(100));
        assert_eq!(coordinator.run(), Ok(()));
        assert_eq!(coordinator.run(), Err(LifecycleError::AlreadyRunning));
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn stuck_tasks_are_abandoned_after_the_timeout() {
        let mut coordinator = LifecycleCoordinator::new(Duration::from_millis(50));
        coordinator.register(Arc::new(Stubborn));
        coordinator.run().unwrap();

        let started = Instant::now();
        let report = coordinator.stop().await;

        assert_eq!(report.timed_out, vec!["stubborn".to_string()]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn failed_tasks_are_restarted_per_policy() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(1));
        coordinator.register(Arc::new(Flaky {
            runs: Arc::clone(&runs),
        }));
        coordinator.run().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let report = coordinator.stop().await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(report.joined, vec!["flaky".to_string()]);
    }
}

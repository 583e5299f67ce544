//! The single consumer of the event queue.
//!
//! The [`Dispatcher`] pops one event at a time, resolves its method against
//! the [`DispatchTable`], takes fresh cache snapshots and awaits the handler.
//! Handler errors and panics are caught per event, logged and counted; they
//! never stop the loop. Because there is exactly one dispatcher, events are
//! handled in the order they were queued.
//!
//! The stop signal is checked before every pop. An event already popped is
//! always handled to completion.

use crate::cache::Caches;
use crate::lifecycle::{BackgroundTask, TaskExit};
use crate::metrics::DispatchMetrics;
use crate::queue::EventQueue;
use futures::FutureExt;
use showrunner_core::{Event, EventHandler, EventKind, StopSignal};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default wait for an event before re-checking the stop signal.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler acted on the event.
    Handled,
    /// The handler ran and chose not to act.
    Declined,
    /// The handler returned an error or panicked.
    Failed,
    /// No handler for this method.
    Unhandled,
}

impl DispatchOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Declined => "declined",
            Self::Failed => "failed",
            Self::Unhandled => "unhandled",
        }
    }
}

/// Maps event kinds to their handlers.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        f.debug_struct("DispatchTable").field("kinds", &kinds).finish()
    }
}

impl DispatchTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler, builder style.
    #[must_use]
    pub fn with(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Adds or replaces the handler for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// The handler for `kind`.
    #[must_use]
    pub fn get(&self, kind: EventKind) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&kind)
    }

    /// Whether a handler is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Running totals per outcome.
#[derive(Debug, Default)]
pub struct DispatchStats {
    handled: AtomicU64,
    declined: AtomicU64,
    failed: AtomicU64,
    unhandled: AtomicU64,
}

impl DispatchStats {
    fn record(&self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Handled => &self.handled,
            DispatchOutcome::Declined => &self.declined,
            DispatchOutcome::Failed => &self.failed,
            DispatchOutcome::Unhandled => &self.unhandled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Events whose handler acted.
    #[must_use]
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Events whose handler declined.
    #[must_use]
    pub fn declined(&self) -> u64 {
        self.declined.load(Ordering::Relaxed)
    }

    /// Events whose handler failed.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Events with no handler.
    #[must_use]
    pub fn unhandled(&self) -> u64 {
        self.unhandled.load(Ordering::Relaxed)
    }

    /// Every event taken off the queue.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.handled() + self.declined() + self.failed() + self.unhandled()
    }
}

/// Pops events and routes them to handlers.
#[derive(Debug)]
pub struct Dispatcher {
    queue: EventQueue,
    table: DispatchTable,
    caches: Caches,
    poll_timeout: Duration,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Creates a dispatcher over `queue`.
    #[must_use]
    pub fn new(queue: EventQueue, table: DispatchTable, caches: Caches) -> Self {
        Self {
            queue,
            table,
            caches,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Sets how long a pop waits before re-checking the stop signal.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Shared outcome counters.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Dispatches one event. Never fails.
    pub async fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let outcome = self.route(event).await;
        self.stats.record(outcome);
        DispatchMetrics::record_outcome(outcome.as_str(), self.queue.len());
        outcome
    }

    async fn route(&self, event: &Event) -> DispatchOutcome {
        let Some(kind) = event.kind() else {
            tracing::warn!(
                method = event.method(),
                source_id = event.source_id(),
                "Unhandled event method"
            );
            return DispatchOutcome::Unhandled;
        };

        let Some(handler) = self.table.get(kind) else {
            tracing::debug!(method = %kind, source_id = event.source_id(), "No handler registered");
            return DispatchOutcome::Unhandled;
        };

        let snapshots = self.caches.snapshot();
        let started = Instant::now();
        let result = AssertUnwindSafe(handler.handle(event.payload(), &snapshots))
            .catch_unwind()
            .await;
        DispatchMetrics::record_duration(kind.method(), started.elapsed());

        match result {
            Ok(Ok(true)) => {
                tracing::debug!(method = %kind, source_id = event.source_id(), "Event handled");
                DispatchOutcome::Handled
            },
            Ok(Ok(false)) => {
                tracing::debug!(method = %kind, source_id = event.source_id(), "Handler declined event");
                DispatchOutcome::Declined
            },
            Ok(Err(e)) => {
                tracing::error!(
                    method = %kind,
                    source_id = event.source_id(),
                    error = %e,
                    "Handler failed"
                );
                DispatchOutcome::Failed
            },
            Err(_) => {
                tracing::error!(method = %kind, source_id = event.source_id(), "Handler panicked");
                DispatchOutcome::Failed
            },
        }
    }

    async fn dispatch_until_stopped(&self, stop: StopSignal) -> TaskExit {
        tracing::info!(kinds = self.table.len(), "Dispatcher started");
        while !stop.is_set() {
            // Nothing is popped once the signal is set, even mid-wait.
            let popped = tokio::select! {
                biased;
                () = stop.triggered() => break,
                popped = self.queue.pop_timeout(self.poll_timeout) => popped,
            };
            if let Some(event) = popped {
                self.dispatch(&event).await;
            }
        }
        tracing::info!(
            dispatched = self.stats.total(),
            remaining = self.queue.len(),
            "Dispatcher stopped"
        );
        TaskExit::Stopped
    }
}

impl BackgroundTask for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn run(&self, stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>> {
        Box::pin(self.dispatch_until_stopped(stop))
    }
}

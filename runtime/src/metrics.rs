//! Prometheus metrics for the pipeline.
//!
//! Every loop records through one of the small recorder types below
//! ([`IngestMetrics`], [`DispatchMetrics`], [`CacheMetrics`],
//! [`QueuePollerMetrics`], [`LifecycleMetrics`], [`RetryMetrics`]). Recording
//! without an installed recorder is a no-op, so tests need no setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use showrunner_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://0.0.0.0:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Create a server that will listen on `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            started: false,
        }
    }

    /// The configured listen address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether [`start`](Self::start) installed the exporter.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Describes all metrics, installs the global recorder and starts the
    /// HTTP listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or a recorder
    /// is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        self.started = true;
        tracing::info!(addr = %self.addr, "Metrics endpoint listening");
        Ok(())
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "showrunner_events_enqueued_total",
        "Events pushed onto the event queue, by source"
    );
    describe_counter!(
        "showrunner_source_errors_total",
        "Failed next-batch calls, by source"
    );
    describe_gauge!("showrunner_event_queue_depth", "Events waiting to be dispatched");
    describe_counter!("showrunner_events_archived_total", "Polled events written to the events collection");

    describe_counter!(
        "showrunner_events_dispatched_total",
        "Events taken off the queue, by outcome"
    );
    describe_histogram!(
        "showrunner_handler_duration_seconds",
        "Time spent inside an event handler, by method"
    );

    describe_counter!("showrunner_cache_loads_total", "Cache loads, by cache and outcome");
    describe_gauge!("showrunner_cache_entries", "Users in each cache snapshot");

    describe_counter!(
        "showrunner_queue_poller_actions_total",
        "Song queue poller actions, by action"
    );

    describe_counter!(
        "showrunner_task_restarts_total",
        "Background task restarts, by task"
    );
    describe_counter!(
        "showrunner_shutdown_join_timeouts_total",
        "Tasks abandoned because they did not stop in time"
    );

    describe_counter!("showrunner_retry_attempts_total", "Connection retry attempts");
    describe_counter!("showrunner_retry_successes_total", "Connections that succeeded after a retry");
    describe_counter!("showrunner_retry_exhausted_total", "Connections that ran out of retries");
}

/// Ingestion metrics recorder.
pub struct IngestMetrics;

impl IngestMetrics {
    /// Record a batch pushed onto the queue.
    pub fn record_batch(source: &str, count: usize, depth: usize) {
        counter!("showrunner_events_enqueued_total", "source" => source.to_string())
            .increment(count as u64);
        gauge!("showrunner_event_queue_depth").set(depth as f64);
    }

    /// Record a failed `next_batch`.
    pub fn record_error(source: &str) {
        counter!("showrunner_source_errors_total", "source" => source.to_string()).increment(1);
    }
}

/// Dispatcher metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record one dispatched event.
    pub fn record_outcome(outcome: &'static str, depth: usize) {
        counter!("showrunner_events_dispatched_total", "outcome" => outcome).increment(1);
        gauge!("showrunner_event_queue_depth").set(depth as f64);
    }

    /// Record handler latency.
    pub fn record_duration(method: &'static str, duration: Duration) {
        histogram!("showrunner_handler_duration_seconds", "method" => method)
            .record(duration.as_secs_f64());
    }
}

/// Cache refresher metrics recorder.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a successful load.
    pub fn record_load(cache: &'static str, entries: usize) {
        counter!("showrunner_cache_loads_total", "cache" => cache, "outcome" => "ok").increment(1);
        gauge!("showrunner_cache_entries", "cache" => cache).set(entries as f64);
    }

    /// Record a failed load.
    pub fn record_failure(cache: &'static str) {
        counter!("showrunner_cache_loads_total", "cache" => cache, "outcome" => "error").increment(1);
    }
}

/// Queue poller metrics recorder.
pub struct QueuePollerMetrics;

impl QueuePollerMetrics {
    /// Record a poller action (`started`, `advanced`, `cleared`, ...).
    pub fn record_action(action: &'static str) {
        counter!("showrunner_queue_poller_actions_total", "action" => action).increment(1);
    }
}

/// Lifecycle metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record a task restart.
    pub fn record_restart(task: &str) {
        counter!("showrunner_task_restarts_total", "task" => task.to_string()).increment(1);
    }

    /// Record a task abandoned at shutdown.
    pub fn record_join_timeout() {
        counter!("showrunner_shutdown_join_timeouts_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("showrunner_retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("showrunner_retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("showrunner_retry_exhausted_total").increment(1);
    }
}

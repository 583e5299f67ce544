//! Drives an event source into the event queue.
//!
//! [`IngestionLoop`] opens a source through its [`SourceFactory`], then
//! repeatedly calls `next_batch`, pushes the batch onto the [`EventQueue`]
//! and sleeps for the source's pause. Failures follow the source's
//! [`ErrorPolicy`]:
//!
//! - [`ErrorPolicy::Retry`]: log, sleep, call again with the same cursor
//! - [`ErrorPolicy::Exit`]: log and return [`TaskExit::Failed`]; the
//!   coordinator restarts the loop with a freshly opened source
//!
//! [`ArchivingSourceFactory`] wraps another factory so every event is also
//! written to an [`EventArchive`] before it is queued.

use crate::lifecycle::{BackgroundTask, RestartPolicy, TaskExit};
use crate::metrics::IngestMetrics;
use crate::queue::EventQueue;
use showrunner_core::{
    ErrorPolicy, Event, EventArchive, EventSource, SourceError, SourceFactory, StopSignal,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Default sleep after a failed batch when the source has no pause of its own.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Default delay before a failed loop is restarted.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// The ingestion background task.
pub struct IngestionLoop {
    factory: Arc<dyn SourceFactory>,
    queue: EventQueue,
    retry_pause: Duration,
    restart_delay: Duration,
}

impl std::fmt::Debug for IngestionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionLoop")
            .field("source", &self.factory.name())
            .field("retry_pause", &self.retry_pause)
            .field("restart_delay", &self.restart_delay)
            .finish_non_exhaustive()
    }
}

impl IngestionLoop {
    /// Creates a loop feeding `queue` from sources opened by `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn SourceFactory>, queue: EventQueue) -> Self {
        Self {
            factory,
            queue,
            retry_pause: DEFAULT_RETRY_PAUSE,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }

    /// Sets the sleep after a retried failure for sources without a pause.
    #[must_use]
    pub const fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Sets the delay before the coordinator restarts a failed loop.
    #[must_use]
    pub const fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    async fn ingest_until_stopped(&self, stop: StopSignal) -> TaskExit {
        let mut source = match self.factory.open().await {
            Ok(source) => source,
            Err(e) => {
                IngestMetrics::record_error(self.factory.name());
                tracing::error!(source = self.factory.name(), error = %e, "Failed to open event source");
                return TaskExit::Failed(e.to_string());
            },
        };
        tracing::info!(source = source.name(), "Event ingestion started");

        while !stop.is_set() {
            let pause = match source.next_batch().await {
                Ok(batch) => {
                    if !batch.is_empty() {
                        let count = batch.len();
                        let depth = self.queue.extend(batch);
                        IngestMetrics::record_batch(source.name(), count, depth);
                        tracing::debug!(source = source.name(), count, depth, "Events queued");
                    }
                    source.pause()
                },
                Err(e) => {
                    IngestMetrics::record_error(source.name());
                    match source.error_policy() {
                        ErrorPolicy::Exit => {
                            tracing::error!(source = source.name(), error = %e, "Event source failed");
                            return TaskExit::Failed(e.to_string());
                        },
                        ErrorPolicy::Retry => {
                            tracing::warn!(source = source.name(), error = %e, "Event source failed, retrying");
                            Some(source.pause().unwrap_or(self.retry_pause))
                        },
                    }
                },
            };

            if let Some(pause) = pause {
                if stop.sleep(pause).await {
                    break;
                }
            }
        }

        tracing::info!(source = source.name(), "Event ingestion stopped");
        TaskExit::Stopped
    }
}

impl BackgroundTask for IngestionLoop {
    fn name(&self) -> &str {
        "ingest"
    }

    fn run(&self, stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>> {
        Box::pin(self.ingest_until_stopped(stop))
    }

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::After(self.restart_delay)
    }
}

/// Opens sources that archive every event before handing it on.
pub struct ArchivingSourceFactory {
    inner: Arc<dyn SourceFactory>,
    archive: Arc<dyn EventArchive>,
}

impl ArchivingSourceFactory {
    /// Wraps `inner`, writing every event to `archive`.
    #[must_use]
    pub fn new(inner: Arc<dyn SourceFactory>, archive: Arc<dyn EventArchive>) -> Self {
        Self { inner, archive }
    }
}

impl SourceFactory for ArchivingSourceFactory {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EventSource>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.open().await?;
            let source: Box<dyn EventSource> = Box::new(ArchivingSource {
                inner,
                archive: Arc::clone(&self.archive),
            });
            Ok(source)
        })
    }
}

/// Archives each event of the wrapped source's batches.
///
/// A failed insert is logged; the event is still returned.
struct ArchivingSource {
    inner: Box<dyn EventSource>,
    archive: Arc<dyn EventArchive>,
}

impl ArchivingSource {
    async fn archived_batch(&mut self) -> Result<Vec<Event>, SourceError> {
        let batch = self.inner.next_batch().await?;
        for event in &batch {
            if let Err(e) = self.archive.archive(event).await {
                tracing::warn!(
                    method = event.method(),
                    source_id = event.source_id(),
                    error = %e,
                    "Failed to archive event"
                );
            }
        }
        Ok(batch)
    }
}

impl EventSource for ArchivingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, SourceError>> + Send + '_>> {
        Box::pin(self.archived_batch())
    }

    fn pause(&self) -> Option<Duration> {
        self.inner.pause()
    }

    fn error_policy(&self) -> ErrorPolicy {
        self.inner.error_policy()
    }
}

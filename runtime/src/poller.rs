//! Advances the song-request queue against the external player.

use crate::lifecycle::{BackgroundTask, Cleanup, CleanupError, TaskExit};
use crate::metrics::QueuePollerMetrics;
use showrunner_core::{PlaybackError, PlaybackMode, PlaybackSink, SongQueue, StopSignal, TrackId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Default interval between checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What one check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// Nothing queued.
    Idle,
    /// Player was idle; the head was popped and started.
    Started(TrackId),
    /// The head is now playing and was popped.
    Advanced(TrackId),
    /// Player busy with something other than the head.
    Waiting,
    /// Player idle but starting playback is suppressed in silent mode.
    Suppressed,
}

/// Periodic check of the playback sink.
///
/// - idle player and a non-empty queue: pop the head and start it
/// - busy player whose current track is the head: pop the head
///
/// In [`PlaybackMode::Silent`] nothing is started. On shutdown the poller
/// performs one silent check and, if tracks remain, clears the player's
/// context silently and empties the queue.
pub struct QueuePoller {
    playback: Arc<dyn PlaybackSink>,
    queue: SongQueue,
    interval: Duration,
}

impl std::fmt::Debug for QueuePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePoller")
            .field("queued", &self.queue.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl QueuePoller {
    /// Creates a poller over `queue` and `playback`.
    #[must_use]
    pub fn new(playback: Arc<dyn PlaybackSink>, queue: SongQueue) -> Self {
        Self {
            playback,
            queue,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the check interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The queue this poller drains.
    #[must_use]
    pub const fn queue(&self) -> &SongQueue {
        &self.queue
    }

    /// Runs one check.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if the sink cannot be queried or refuses to
    /// start the popped track. A popped track is not re-queued.
    pub async fn check(&self, mode: PlaybackMode) -> Result<PollAction, PlaybackError> {
        let Some(head) = self.queue.front() else {
            return Ok(PollAction::Idle);
        };

        if self.playback.is_active().await? {
            let current = self.playback.current_track().await?;
            if current.as_ref() == Some(&head) && self.queue.pop_if_front(&head) {
                QueuePollerMetrics::record_action("advanced");
                tracing::info!(track = %head, remaining = self.queue.len(), "Requested track is playing");
                return Ok(PollAction::Advanced(head));
            }
            return Ok(PollAction::Waiting);
        }

        if mode == PlaybackMode::Silent {
            return Ok(PollAction::Suppressed);
        }

        let Some(track) = self.queue.pop_front() else {
            return Ok(PollAction::Idle);
        };
        self.playback.start_playback(&track).await?;
        QueuePollerMetrics::record_action("started");
        tracing::info!(track = %track, remaining = self.queue.len(), "Started requested track");
        Ok(PollAction::Started(track))
    }

    /// Final silent check, then clears leftover requests.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if clearing the player's context fails.
    pub async fn finalize(&self) -> Result<(), PlaybackError> {
        match self.check(PlaybackMode::Silent).await {
            Ok(action) => tracing::debug!(?action, "Final queue check"),
            Err(e) => tracing::warn!(error = %e, "Final queue check failed"),
        }

        if self.queue.is_empty() {
            return Ok(());
        }

        self.playback.clear_context(PlaybackMode::Silent).await?;
        let dropped = self.queue.clear();
        QueuePollerMetrics::record_action("cleared");
        tracing::info!(dropped, "Cleared pending song requests");
        Ok(())
    }

    async fn poll_until_stopped(&self, stop: StopSignal) -> TaskExit {
        while !stop.sleep(self.interval).await {
            match self.check(PlaybackMode::Normal).await {
                Ok(PollAction::Idle | PollAction::Waiting) => {},
                Ok(action) => tracing::debug!(?action, "Queue check"),
                Err(e) => tracing::warn!(error = %e, "Queue check failed"),
            }
        }
        TaskExit::Stopped
    }
}

impl BackgroundTask for QueuePoller {
    fn name(&self) -> &str {
        "queue-poller"
    }

    fn run(&self, stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>> {
        Box::pin(self.poll_until_stopped(stop))
    }
}

impl Cleanup for QueuePoller {
    fn name(&self) -> &str {
        "song-queue"
    }

    fn cleanup(&self) -> Pin<Box<dyn Future<Output = Result<(), CleanupError>> + Send + '_>> {
        Box::pin(async move {
            self.finalize()
                .await
                .map_err(|e| CleanupError(e.to_string()))
        })
    }
}

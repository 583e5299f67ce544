//! Playback sink used when no music service is wired in.

use showrunner_core::{PlaybackError, PlaybackMode, PlaybackSink, TrackId};
use std::future::Future;
use std::pin::Pin;

/// A player that is always idle and only logs what it is asked to do.
///
/// With this sink the queue poller starts one requested track per check, so
/// requests drain at the poll interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPlayback;

impl PlaybackSink for LoggingPlayback {
    fn is_active(&self) -> Pin<Box<dyn Future<Output = Result<bool, PlaybackError>> + Send + '_>> {
        Box::pin(async { Ok(false) })
    }

    fn current_track(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TrackId>, PlaybackError>> + Send + '_>> {
        Box::pin(async { Ok(None) })
    }

    fn start_playback<'a>(
        &'a self,
        track: &'a TrackId,
    ) -> Pin<Box<dyn Future<Output = Result<(), PlaybackError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(track = %track, "Would start playback");
            Ok(())
        })
    }

    fn clear_context(
        &self,
        mode: PlaybackMode,
    ) -> Pin<Box<dyn Future<Output = Result<(), PlaybackError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(?mode, "Would clear playback context");
            Ok(())
        })
    }
}

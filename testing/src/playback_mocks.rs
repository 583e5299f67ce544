//! Recording playback sink.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use showrunner_core::{PlaybackError, PlaybackMode, PlaybackSink, TrackId};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// A call received by [`RecordingPlayback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCall {
    /// `start_playback(track)`
    Start(TrackId),
    /// `clear_context(mode)`
    Clear(PlaybackMode),
}

#[derive(Debug, Default)]
struct PlayerState {
    active: bool,
    current: Option<TrackId>,
    calls: Vec<PlaybackCall>,
    unavailable: bool,
}

/// Playback sink that records every mutating call.
///
/// Starting a track makes the sink active with that track as current, the
/// way a real player would report it on its next poll.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlayback {
    state: Arc<RwLock<PlayerState>>,
}

impl RecordingPlayback {
    /// Creates an idle player.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what the player reports as playing (`None` makes it idle).
    pub fn set_playing(&self, track: Option<TrackId>) {
        let mut state = self.state.write().unwrap();
        state.active = track.is_some();
        state.current = track;
    }

    /// Makes every call fail with [`PlaybackError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Every mutating call received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PlaybackCall> {
        self.state.read().unwrap().calls.clone()
    }

    /// Tracks passed to `start_playback`, in order.
    #[must_use]
    pub fn started(&self) -> Vec<TrackId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlaybackCall::Start(track) => Some(track),
                PlaybackCall::Clear(_) => None,
            })
            .collect()
    }

    fn check_available(&self) -> Result<(), PlaybackError> {
        if self.state.read().unwrap().unavailable {
            Err(PlaybackError::Unavailable("player offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl PlaybackSink for RecordingPlayback {
    fn is_active(&self) -> Pin<Box<dyn Future<Output = Result<bool, PlaybackError>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.state.read().unwrap().active)
        })
    }

    fn current_track(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TrackId>, PlaybackError>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.state.read().unwrap().current.clone())
        })
    }

    fn start_playback<'a>(
        &'a self,
        track: &'a TrackId,
    ) -> Pin<Box<dyn Future<Output = Result<(), PlaybackError>> + Send + 'a>> {
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().unwrap();
            state.calls.push(PlaybackCall::Start(track.clone()));
            state.active = true;
            state.current = Some(track.clone());
            Ok(())
        })
    }

    fn clear_context(
        &self,
        mode: PlaybackMode,
    ) -> Pin<Box<dyn Future<Output = Result<(), PlaybackError>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().unwrap();
            state.calls.push(PlaybackCall::Clear(mode));
            state.active = false;
            state.current = None;
            Ok(())
        })
    }
}

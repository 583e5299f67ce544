//! The external playback sink and the pending song-request queue.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors reported by a playback sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The sink could not be reached.
    #[error("Playback sink unavailable: {0}")]
    Unavailable(String),

    /// The sink refused the request.
    #[error("Playback request rejected: {0}")]
    Rejected(String),
}

/// Opaque identifier of a playable track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(String);

impl TrackId {
    /// Wraps a track identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Whether a playback action may be visible to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Regular operation.
    Normal,
    /// Shutdown path: observe and tidy up without audible side effects.
    Silent,
}

/// An external player that can report and change what is playing.
pub trait PlaybackSink: Send + Sync {
    /// Whether something is currently playing.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if the sink cannot be queried.
    fn is_active(&self) -> Pin<Box<dyn Future<Output = Result<bool, PlaybackError>> + Send + '_>>;

    /// The track now playing, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if the sink cannot be queried.
    fn current_track(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TrackId>, PlaybackError>> + Send + '_>>;

    /// Starts playing `track` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if the sink refuses or cannot be reached.
    fn start_playback<'a>(
        &'a self,
        track: &'a TrackId,
    ) -> Pin<Box<dyn Future<Output = Result<(), PlaybackError>> + Send + 'a>>;

    /// Drops whatever playback context the sink holds.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if the sink refuses or cannot be reached.
    fn clear_context(
        &self,
        mode: PlaybackMode,
    ) -> Pin<Box<dyn Future<Output = Result<(), PlaybackError>> + Send + '_>>;
}

/// FIFO of requested tracks waiting to be played.
///
/// Song-request handlers [`enqueue`](Self::enqueue); only the queue poller
/// removes items. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct SongQueue {
    tracks: Arc<Mutex<VecDeque<TrackId>>>,
}

impl SongQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TrackId>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a track and returns the new queue length.
    pub fn enqueue(&self, track: TrackId) -> usize {
        let mut tracks = self.lock();
        tracks.push_back(track);
        tracks.len()
    }

    /// The track at the head of the queue.
    #[must_use]
    pub fn front(&self) -> Option<TrackId> {
        self.lock().front().cloned()
    }

    /// Removes and returns the head of the queue.
    pub fn pop_front(&self) -> Option<TrackId> {
        self.lock().pop_front()
    }

    /// Removes the head only if it equals `track`.
    pub fn pop_if_front(&self, track: &TrackId) -> bool {
        let mut tracks = self.lock();
        if tracks.front() == Some(track) {
            tracks.pop_front();
            true
        } else {
            false
        }
    }

    /// Removes every queued track, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut tracks = self.lock();
        let count = tracks.len();
        tracks.clear();
        count
    }

    /// Number of queued tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of the queued tracks in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TrackId> {
        self.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_fifo_order() {
        let queue = SongQueue::new();
        assert_eq!(queue.enqueue("a".into()), 1);
        assert_eq!(queue.enqueue("b".into()), 2);

        assert_eq!(queue.front(), Some(TrackId::new("a")));
        assert_eq!(queue.pop_front(), Some(TrackId::new("a")));
        assert_eq!(queue.pop_front(), Some(TrackId::new("b")));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn pop_if_front_only_pops_a_matching_head() {
        let queue = SongQueue::new();
        queue.enqueue("a".into());
        queue.enqueue("b".into());

        assert!(!queue.pop_if_front(&TrackId::new("b")));
        assert_eq!(queue.len(), 2);

        assert!(queue.pop_if_front(&TrackId::new("a")));
        assert_eq!(queue.to_vec(), vec![TrackId::new("b")]);
    }

    #[test]
    fn clones_share_state_and_clear_reports_count() {
        let queue = SongQueue::new();
        let handle = queue.clone();
        handle.enqueue("a".into());
        handle.enqueue("b".into());

        assert_eq!(queue.clear(), 2);
        assert!(handle.is_empty());
    }
}

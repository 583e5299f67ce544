//! Shared collaborators and state handed to handlers and loops.

use crate::actions::{ChatActions, LoggingChatActions};
use crate::audio::{AudioError, AudioPlayer, CommandAudioPlayer};
use crate::config::Config;
use crate::playback::LoggingPlayback;
use crate::songs::{SongExtractor, SpotifyLinkExtractor};
use showrunner_core::{PlaybackSink, SongQueue};
use showrunner_runtime::Caches;
use std::sync::Arc;

/// Everything handlers need, constructed once at startup.
///
/// Clones share the caches, the song queue and every collaborator.
#[derive(Clone)]
pub struct AppContext {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Privileged-user caches, kept fresh by the refreshers.
    pub caches: Caches,
    /// Requested tracks waiting for the player.
    pub songs: SongQueue,
    /// The external player.
    pub playback: Arc<dyn PlaybackSink>,
    /// Local audio output for VIP entrances.
    pub audio: Arc<dyn AudioPlayer>,
    /// Executor for admin commands and custom actions.
    pub actions: Arc<dyn ChatActions>,
    /// Finds requested songs in tip messages.
    pub extractor: Arc<dyn SongExtractor>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("components", &self.config.components)
            .field("queued_songs", &self.songs.len())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Builds the default collaborators for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::NoPlayer`] if the audio player command is empty.
    pub fn new(config: Config) -> Result<Self, AudioError> {
        let audio = CommandAudioPlayer::new(&config.general.audio_player_command)?;
        Ok(Self {
            config: Arc::new(config),
            caches: Caches::default(),
            songs: SongQueue::new(),
            playback: Arc::new(LoggingPlayback),
            audio: Arc::new(audio),
            actions: Arc::new(LoggingChatActions),
            extractor: Arc::new(SpotifyLinkExtractor),
        })
    }

    /// Replaces the playback sink.
    #[must_use]
    pub fn with_playback(mut self, playback: Arc<dyn PlaybackSink>) -> Self {
        self.playback = playback;
        self
    }

    /// Replaces the audio player.
    #[must_use]
    pub fn with_audio(mut self, audio: Arc<dyn AudioPlayer>) -> Self {
        self.audio = audio;
        self
    }

    /// Replaces the chat action executor.
    #[must_use]
    pub fn with_actions(mut self, actions: Arc<dyn ChatActions>) -> Self {
        self.actions = actions;
        self
    }

    /// Replaces the song extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn SongExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

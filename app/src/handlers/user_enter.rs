use super::username;
use crate::audio::AudioPlayer;
use crate::context::AppContext;
use serde_json::Value;
use showrunner_core::{CacheSnapshots, EventHandler, HandlerError};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Plays a VIP user's entrance audio when they enter the room.
///
/// Each user has a cooldown: after a play, further entrances within the
/// cooldown are ignored. The cooldown only starts once playback started.
pub struct VipAudioHandler {
    audio: Arc<dyn AudioPlayer>,
    audio_dir: PathBuf,
    cooldown: Duration,
    last_played: Mutex<HashMap<String, Instant>>,
}

impl std::fmt::Debug for VipAudioHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VipAudioHandler")
            .field("audio_dir", &self.audio_dir)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl VipAudioHandler {
    /// Creates the handler from the shared context.
    #[must_use]
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            audio: Arc::clone(&ctx.audio),
            audio_dir: ctx.config.general.vip_audio_dir.clone(),
            cooldown: ctx.config.general.vip_cooldown,
            last_played: Mutex::new(HashMap::new()),
        }
    }

    fn in_cooldown(&self, user: &str) -> bool {
        self.last_played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .is_some_and(|at| at.elapsed() < self.cooldown)
    }

    fn mark_played(&self, user: &str) {
        self.last_played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_string(), Instant::now());
    }

    async fn greet(&self, payload: &Value, caches: &CacheSnapshots) -> Result<bool, HandlerError> {
        let user = username(payload)
            .ok_or_else(|| HandlerError::InvalidPayload("missing `user.username`".to_string()))?;

        let Some(file) = caches.vip_audio(user) else {
            return Ok(true);
        };
        if self.in_cooldown(user) {
            tracing::debug!(user, "VIP entered during cooldown");
            return Ok(true);
        }

        let path = self.audio_dir.join(file);
        tracing::info!(user, file = %path.display(), "Playing VIP entrance audio");
        self.audio
            .play(&path)
            .await
            .map_err(|e| HandlerError::Collaborator(e.to_string()))?;
        self.mark_played(user);
        Ok(true)
    }
}

impl EventHandler for VipAudioHandler {
    fn handle<'a>(
        &'a self,
        payload: &'a Value,
        caches: &'a CacheSnapshots,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>> {
        Box::pin(self.greet(payload, caches))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::audio::AudioError;
    use crate::config::Config;
    use serde_json::json;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingAudio {
        played: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl AudioPlayer for RecordingAudio {
        fn play<'a>(&'a self, path: &'a Path) -> Pin<Box<dyn Future<Output = Result<(), AudioError>> + Send + 'a>> {
            Box::pin(async move {
                if self.fail {
                    return Err(AudioError::NotFound(path.to_path_buf()));
                }
                self.played.lock().unwrap().push(path.to_path_buf());
                Ok(())
            })
        }
    }

    fn handler(cooldown_hours: &str, audio: Arc<RecordingAudio>) -> VipAudioHandler {
        let config = Config::from_lookup(|key| match key {
            "VIP_COOLDOWN_HOURS" => Some(cooldown_hours.to_string()),
            "VIP_AUDIO_DIR" => Some("/srv/vip".to_string()),
            _ => None,
        })
        .unwrap();
        VipAudioHandler::new(&AppContext::new(config).unwrap().with_audio(audio))
    }

    fn snapshots() -> CacheSnapshots {
        CacheSnapshots {
            vip: Arc::new(HashMap::from([("alice".to_string(), "alice.mp3".to_string())])),
            ..CacheSnapshots::default()
        }
    }

    fn enter(user: &str) -> Value {
        json!({"user": {"username": user}})
    }

    #[tokio::test]
    async fn vip_entrance_plays_once_per_cooldown() {
        let audio = Arc::new(RecordingAudio::default());
        let handler = handler("1", audio.clone());

        assert!(handler.handle(&enter("alice"), &snapshots()).await.unwrap());
        assert!(handler.handle(&enter("alice"), &snapshots()).await.unwrap());

        assert_eq!(*audio.played.lock().unwrap(), vec![PathBuf::from("/srv/vip/alice.mp3")]);
    }

    #[tokio::test]
    async fn zero_cooldown_plays_every_time() {
        let audio = Arc::new(RecordingAudio::default());
        let handler = handler("0", audio.clone());

        handler.handle(&enter("alice"), &snapshots()).await.unwrap();
        handler.handle(&enter("alice"), &snapshots()).await.unwrap();

        assert_eq!(audio.played.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_vips_are_ignored() {
        let audio = Arc::new(RecordingAudio::default());
        let handler = handler("1", audio.clone());

        assert!(handler.handle(&enter("bob"), &snapshots()).await.unwrap());
        assert!(audio.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_playback_does_not_start_the_cooldown() {
        let failing = Arc::new(RecordingAudio {
            fail: true,
            ..RecordingAudio::default()
        });
        let handler = handler("1", failing);

        let result = handler.handle(&enter("alice"), &snapshots()).await;

        assert!(matches!(result, Err(HandlerError::Collaborator(_))));
        assert!(!handler.in_cooldown("alice"));
    }
}

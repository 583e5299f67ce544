use super::username;
use crate::context::AppContext;
use crate::songs::SongExtractor;
use serde_json::Value;
use showrunner_core::{CacheSnapshots, EventHandler, HandlerError, SongQueue};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Turns tips into song requests.
///
/// A tip of `tokens` where `tokens` is a positive multiple of the song cost
/// requests `tokens / song_cost` songs. The songs are read from the tip
/// message and appended to the song queue; the queue poller plays them.
/// Other tips are declined.
pub struct TipHandler {
    song_cost: u64,
    extractor: Arc<dyn SongExtractor>,
    songs: SongQueue,
}

impl std::fmt::Debug for TipHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TipHandler")
            .field("song_cost", &self.song_cost)
            .finish_non_exhaustive()
    }
}

impl TipHandler {
    /// Creates the handler from the shared context.
    #[must_use]
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            song_cost: ctx.config.general.song_cost,
            extractor: Arc::clone(&ctx.extractor),
            songs: ctx.songs.clone(),
        }
    }

    /// Number of songs a tip of `tokens` pays for, if it is a song request.
    #[must_use]
    pub const fn request_count(&self, tokens: u64) -> Option<u64> {
        if self.song_cost == 0 || tokens == 0 || tokens % self.song_cost != 0 {
            return None;
        }
        Some(tokens / self.song_cost)
    }

    fn request_songs(&self, payload: &Value) -> Result<bool, HandlerError> {
        let tip = payload
            .get("tip")
            .ok_or_else(|| HandlerError::InvalidPayload("missing `tip`".to_string()))?;
        let tokens = tip
            .get("tokens")
            .and_then(Value::as_u64)
            .ok_or_else(|| HandlerError::InvalidPayload("missing `tip.tokens`".to_string()))?;
        let user = username(payload).unwrap_or("anonymous");

        let Some(count) = self.request_count(tokens) else {
            tracing::debug!(user, tokens, song_cost = self.song_cost, "Tip is not a song request");
            return Ok(false);
        };

        let message = tip.get("message").and_then(Value::as_str).unwrap_or_default();
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let tracks = self.extractor.extract(message, count);
        if tracks.len() < count {
            tracing::warn!(user, requested = count, found = tracks.len(), "Fewer songs found than paid for");
        }

        for track in tracks {
            let depth = self.songs.enqueue(track.clone());
            tracing::info!(user, track = %track, depth, "Song request queued");
        }
        Ok(true)
    }
}

impl EventHandler for TipHandler {
    fn handle<'a>(
        &'a self,
        payload: &'a Value,
        _caches: &'a CacheSnapshots,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>> {
        Box::pin(async move { self.request_songs(payload) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use showrunner_core::TrackId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingExtractor {
        requested: Mutex<Vec<usize>>,
    }

    impl SongExtractor for CountingExtractor {
        fn extract(&self, _message: &str, count: usize) -> Vec<TrackId> {
            self.requested.lock().unwrap().push(count);
            (0..count).map(|n| TrackId::new(format!("spotify:track:{n}"))).collect()
        }
    }

    fn handler(song_cost: &str) -> (TipHandler, Arc<CountingExtractor>, SongQueue) {
        let config = Config::from_lookup(|key| (key == "SONG_COST").then(|| song_cost.to_string())).unwrap();
        let extractor = Arc::new(CountingExtractor::default());
        let ctx = AppContext::new(config).unwrap().with_extractor(extractor.clone());
        (TipHandler::new(&ctx), extractor, ctx.songs)
    }

    #[tokio::test]
    async fn multiple_of_song_cost_requests_that_many_songs() {
        let (handler, extractor, songs) = handler("50");
        let payload = json!({"tip": {"tokens": 100, "message": "two please"}, "user": {"username": "alice"}});

        let handled = handler.handle(&payload, &CacheSnapshots::default()).await.unwrap();

        assert!(handled);
        assert_eq!(*extractor.requested.lock().unwrap(), vec![2]);
        assert_eq!(songs.len(), 2);
    }

    #[tokio::test]
    async fn other_amounts_are_declined() {
        let (handler, extractor, songs) = handler("50");

        for tokens in [0, 25, 75] {
            let payload = json!({"tip": {"tokens": tokens, "message": ""}});
            assert!(!handler.handle(&payload, &CacheSnapshots::default()).await.unwrap());
        }

        assert!(extractor.requested.lock().unwrap().is_empty());
        assert!(songs.is_empty());
    }

    #[tokio::test]
    async fn missing_tokens_is_an_invalid_payload() {
        let (handler, _, _) = handler("50");

        let result = handler.handle(&json!({"tip": {}}), &CacheSnapshots::default()).await;

        assert!(matches!(result, Err(HandlerError::InvalidPayload(_))));
    }

    #[test]
    fn request_count_arithmetic() {
        let (handler, _, _) = handler("25");
        assert_eq!(handler.request_count(25), Some(1));
        assert_eq!(handler.request_count(100), Some(4));
        assert_eq!(handler.request_count(30), None);
    }
}

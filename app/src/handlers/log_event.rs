use super::username;
use serde_json::Value;
use showrunner_core::{CacheSnapshots, EventHandler, EventKind, HandlerError};
use std::future::Future;
use std::pin::Pin;

/// Records that an event arrived and succeeds.
#[derive(Debug, Clone, Copy)]
pub struct LogEvent {
    kind: EventKind,
}

impl LogEvent {
    /// Creates a handler for `kind`.
    #[must_use]
    pub const fn new(kind: EventKind) -> Self {
        Self { kind }
    }
}

impl EventHandler for LogEvent {
    fn handle<'a>(
        &'a self,
        payload: &'a Value,
        _caches: &'a CacheSnapshots,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                kind = %self.kind,
                user = username(payload).unwrap_or("-"),
                "Event received"
            );
            Ok(true)
        })
    }
}

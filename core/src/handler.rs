//! Event handlers: the side-effecting end of the pipeline.

use crate::playback::PlaybackError;
use crate::snapshot::CacheSnapshots;
use crate::store::StoreError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors a handler may report for one event.
///
/// The dispatcher logs and counts them; they never stop the pipeline.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The payload did not have the fields the handler needs.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A collaborator (player, command runner, ...) failed.
    #[error("Collaborator failed: {0}")]
    Collaborator(String),

    /// Playback sink error.
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Document store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handles one kind of event.
///
/// Returns `Ok(true)` when the handler acted on the event and `Ok(false)`
/// when it deliberately did nothing (e.g. a tip that is not a song request).
pub trait EventHandler: Send + Sync {
    /// Handles an event payload with the cache snapshots taken for it.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if handling failed.
    fn handle<'a>(
        &'a self,
        payload: &'a Value,
        caches: &'a CacheSnapshots,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>>;
}

//! Event sources: where raw events come from.
//!
//! Two kinds of source feed the pipeline:
//!
//! - **push** sources wait on a change-notification subscription and hand back
//!   whatever arrived within a short window (possibly nothing);
//! - **pull** sources call a paginated remote endpoint once per batch, follow
//!   its cursor, and ask to be paused between calls.
//!
//! Both expose the same [`EventSource::next_batch`] contract. The ingestion
//! loop in `showrunner-runtime` drives a source, pushes its batches onto the
//! event queue, and observes the stop signal between batches.
//!
//! # Dyn Compatibility
//!
//! Like the other capability traits in this crate, methods return
//! `Pin<Box<dyn Future>>` so sources can be stored as `Box<dyn EventSource>`.

use crate::event::Event;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while reading from a source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Could not open the source (connect, subscribe).
    #[error("Failed to open event source: {0}")]
    Connection(String),

    /// A live subscription broke.
    #[error("Event subscription lost: {0}")]
    SubscriptionLost(String),

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The URL that was requested.
        url: String,
    },

    /// The response could not be decoded.
    #[error("Failed to decode events: {0}")]
    Decode(String),
}

/// What the ingestion loop does when `next_batch` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log and end the loop; the coordinator may restart it with a fresh source.
    Exit,
    /// Log, wait for the source's pause, and call `next_batch` again.
    Retry,
}

/// An opened, stateful source of events.
pub trait EventSource: Send {
    /// Short name used in logs and metrics.
    fn name(&self) -> &str;

    /// Fetches the next batch of events.
    ///
    /// An empty batch is a normal outcome (nothing new within the wait
    /// window). Implementations must return within a bounded time so the
    /// caller can observe shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the underlying subscription or request
    /// fails. The caller applies [`error_policy`](Self::error_policy).
    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, SourceError>> + Send + '_>>;

    /// How long to sleep between batches, if at all.
    fn pause(&self) -> Option<Duration> {
        None
    }

    /// How failures of `next_batch` are treated.
    fn error_policy(&self) -> ErrorPolicy;
}

/// Opens fresh [`EventSource`]s.
///
/// The ingestion loop calls `open` on every (re)start, so a source whose
/// subscription was lost is replaced rather than resumed.
pub trait SourceFactory: Send + Sync {
    /// Name of the sources this factory opens.
    fn name(&self) -> &str;

    /// Opens a new source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Connection`] if the source cannot be opened.
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EventSource>, SourceError>> + Send + '_>>;
}

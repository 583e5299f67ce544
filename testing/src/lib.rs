//! # Showrunner Testing
//!
//! In-memory doubles for every capability trait of `showrunner-core`, so the
//! pipeline can be exercised without a database, an HTTP endpoint or a player.
//!
//! - [`ScriptedSourceFactory`]: replays batches and errors
//! - [`InMemoryUserDirectory`]: user documents with failure injection
//! - [`InMemoryEventArchive`]: collects archived events
//! - [`RecordingPlayback`]: records player calls
//! - [`RecordingHandler`]: records payloads and snapshots
//!
//! ## Example
//!
//! ```ignore
//! let handler = RecordingHandler::default();
//! let table = DispatchTable::new().with(EventKind::Tip, Arc::new(handler.clone()));
//!
//! let dispatcher = Dispatcher::new(queue.clone(), table, Caches::default());
//! dispatcher.dispatch(&event("tip", json!({}))).await;
//!
//! assert_eq!(handler.calls(), 1);
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

pub mod handler_mocks;
pub mod playback_mocks;
pub mod source_mocks;
pub mod store_mocks;

pub use handler_mocks::{Behavior, RecordingHandler};
pub use playback_mocks::{PlaybackCall, RecordingPlayback};
pub use source_mocks::ScriptedSourceFactory;
pub use store_mocks::{InMemoryEventArchive, InMemoryUserDirectory};

use serde_json::Value;
use showrunner_core::Event;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Builds an event with a fresh source id.
#[must_use]
pub fn event(method: &str, payload: Value) -> Event {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    Event::new(method, payload, format!("test-{id}"))
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// passes. Returns whether it held.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Installs a test subscriber honouring `RUST_LOG`; safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

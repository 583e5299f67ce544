//! Recording event handler.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::panic)] // Panicking on demand is the point of `Behavior::Panic`

use serde_json::Value;
use showrunner_core::{CacheSnapshots, EventHandler, HandlerError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// How a [`RecordingHandler`] responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Return `Ok(true)`.
    Handle,
    /// Return `Ok(false)`.
    Decline,
    /// Return an error.
    Fail,
    /// Panic.
    Panic,
}

/// Handler that records every payload it sees, with the snapshots it got.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    seen: Arc<RwLock<Vec<(Value, CacheSnapshots)>>>,
    behavior: Behavior,
    delay: Duration,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new(Behavior::Handle)
    }
}

impl RecordingHandler {
    /// Creates a handler with the given behavior.
    #[must_use]
    pub fn new(behavior: Behavior) -> Self {
        Self {
            seen: Arc::new(RwLock::new(Vec::new())),
            behavior,
            delay: Duration::ZERO,
        }
    }

    /// Makes every call take at least `delay`, after recording its payload.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Payloads received, in order.
    #[must_use]
    pub fn payloads(&self) -> Vec<Value> {
        self.seen.read().unwrap().iter().map(|(payload, _)| payload.clone()).collect()
    }

    /// Snapshots received, in order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<CacheSnapshots> {
        self.seen.read().unwrap().iter().map(|(_, snapshots)| snapshots.clone()).collect()
    }

    /// Number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.seen.read().unwrap().len()
    }
}

impl EventHandler for RecordingHandler {
    fn handle<'a>(
        &'a self,
        payload: &'a Value,
        caches: &'a CacheSnapshots,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            self.seen.write().unwrap().push((payload.clone(), caches.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.behavior {
                Behavior::Handle => Ok(true),
                Behavior::Decline => Ok(false),
                Behavior::Fail => Err(HandlerError::Collaborator("recorded failure".to_string())),
                Behavior::Panic => panic!("recorded handler panic"),
            }
        })
    }
}

//! The unbounded FIFO between ingestion and dispatch.

use showrunner_core::Event;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    events: Mutex<VecDeque<Event>>,
    available: Notify,
}

/// Unbounded, thread-safe event FIFO.
///
/// Pushing never blocks. Popping waits only while the queue is empty, and
/// never longer than the caller's timeout. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl EventQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.inner.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event and returns the new depth.
    pub fn push(&self, event: Event) -> usize {
        let depth = {
            let mut events = self.events();
            events.push_back(event);
            events.len()
        };
        self.inner.available.notify_one();
        depth
    }

    /// Appends every event of a batch, in order, and returns the new depth.
    pub fn extend(&self, batch: impl IntoIterator<Item = Event>) -> usize {
        let depth = {
            let mut events = self.events();
            events.extend(batch);
            events.len()
        };
        self.inner.available.notify_one();
        depth
    }

    /// Removes the head without waiting.
    pub fn try_pop(&self) -> Option<Event> {
        self.events().pop_front()
    }

    /// Removes the head, waiting up to `timeout` for one to arrive.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a push between the check
            // and the await is not missed.
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.try_pop() {
                if !self.is_empty() {
                    // Pass the wakeup on to any other waiter.
                    self.inner.available.notify_one();
                }
                return Some(event);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

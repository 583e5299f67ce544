//! Scripted event sources.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use showrunner_core::{ErrorPolicy, Event, EventSource, SourceError, SourceFactory};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Step = Result<Vec<Event>, SourceError>;

#[derive(Debug, Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    opens: AtomicUsize,
    batches: AtomicUsize,
    fail_opens: AtomicUsize,
}

/// Factory for sources that replay a fixed script of batches and errors.
///
/// All sources opened from one factory share the script, so a source that is
/// reopened after an error continues where the previous one stopped. Once the
/// script is exhausted, `next_batch` waits briefly and returns an empty batch.
///
/// # Example
///
/// ```
/// use showrunner_testing::{ScriptedSourceFactory, event};
/// use showrunner_core::ErrorPolicy;
/// use serde_json::json;
///
/// let factory = ScriptedSourceFactory::new(ErrorPolicy::Exit)
///     .then_batch(vec![event("tip", json!({ "tip": { "tokens": 10 } }))]);
/// assert_eq!(factory.remaining(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedSourceFactory {
    script: Arc<Script>,
    policy: ErrorPolicy,
    pause: Option<Duration>,
    idle_wait: Duration,
}

impl ScriptedSourceFactory {
    /// Creates an empty script with the given error policy.
    #[must_use]
    pub fn new(policy: ErrorPolicy) -> Self {
        Self {
            script: Arc::new(Script::default()),
            policy,
            pause: None,
            idle_wait: Duration::from_millis(10),
        }
    }

    /// Appends a batch to the script.
    #[must_use]
    pub fn then_batch(self, events: Vec<Event>) -> Self {
        self.script.steps.lock().unwrap().push_back(Ok(events));
        self
    }

    /// Appends a failure to the script.
    #[must_use]
    pub fn then_error(self, error: SourceError) -> Self {
        self.script.steps.lock().unwrap().push_back(Err(error));
        self
    }

    /// Sets the pause sources report between batches.
    #[must_use]
    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Makes the next `count` calls to `open` fail.
    #[must_use]
    pub fn failing_opens(self, count: usize) -> Self {
        self.script.fail_opens.store(count, Ordering::SeqCst);
        self
    }

    /// Script steps not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.steps.lock().unwrap().len()
    }

    /// Number of sources opened so far (including failed opens).
    #[must_use]
    pub fn opens(&self) -> usize {
        self.script.opens.load(Ordering::SeqCst)
    }

    /// Number of `next_batch` calls across all opened sources.
    #[must_use]
    pub fn batches(&self) -> usize {
        self.script.batches.load(Ordering::SeqCst)
    }
}

impl SourceFactory for ScriptedSourceFactory {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EventSource>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            self.script.opens.fetch_add(1, Ordering::SeqCst);
            let should_fail = self
                .script
                .fail_opens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(SourceError::Connection("scripted open failure".to_string()));
            }

            let source: Box<dyn EventSource> = Box::new(ScriptedSource {
                script: Arc::clone(&self.script),
                policy: self.policy,
                pause: self.pause,
                idle_wait: self.idle_wait,
            });
            Ok(source)
        })
    }
}

struct ScriptedSource {
    script: Arc<Script>,
    policy: ErrorPolicy,
    pause: Option<Duration>,
    idle_wait: Duration,
}

impl EventSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            self.script.batches.fetch_add(1, Ordering::SeqCst);
            let step = self.script.steps.lock().unwrap().pop_front();
            match step {
                Some(step) => step,
                None => {
                    tokio::time::sleep(self.idle_wait).await;
                    Ok(Vec::new())
                },
            }
        })
    }

    fn pause(&self) -> Option<Duration> {
        self.pause
    }

    fn error_policy(&self) -> ErrorPolicy {
        self.policy
    }
}

//! In-memory document store doubles.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use serde_json::Value;
use showrunner_core::{Event, EventArchive, StoreError, UserDirectory, UserFlag, UserRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// User directory backed by a list of documents.
///
/// Queries apply the same filter as the real store: the flag attribute and
/// `active` must both be `true`. Failures can be injected for the next N
/// queries or until cleared.
///
/// # Example
///
/// ```
/// use showrunner_testing::InMemoryUserDirectory;
/// use serde_json::json;
///
/// let directory = InMemoryUserDirectory::new();
/// directory.insert(json!({ "username": "bob", "vip": true, "active": true }));
/// assert_eq!(directory.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<Vec<Value>>>,
    fail_next: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    queries: Arc<AtomicUsize>,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user document.
    pub fn insert(&self, document: Value) {
        self.users.write().unwrap().push(document);
    }

    /// Replaces every user document.
    pub fn set_users(&self, documents: Vec<Value>) {
        *self.users.write().unwrap() = documents;
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    /// Whether no documents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next `count` queries fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes every query fail until set back to `false`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of queries served (including failures).
    #[must_use]
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
            || self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }

    fn matching(&self, flag: UserFlag) -> Vec<UserRecord> {
        let is_true = |doc: &Value, key: &str| doc.get(key).and_then(Value::as_bool) == Some(true);
        self.users
            .read()
            .unwrap()
            .iter()
            .filter(|doc| is_true(doc, flag.attribute()) && is_true(doc, "active"))
            .filter_map(|doc| UserRecord::from_document(doc.clone()).ok())
            .collect()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_active(
        &self,
        flag: UserFlag,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UserRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.should_fail() {
                return Err(StoreError::Connection("injected failure".to_string()));
            }
            Ok(self.matching(flag))
        })
    }
}

/// Event archive that keeps events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventArchive {
    events: Arc<RwLock<Vec<Event>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryEventArchive {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert fail until set back to `false`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Archived events in insertion order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().unwrap().clone()
    }
}

impl EventArchive for InMemoryEventArchive {
    fn archive<'a>(
        &'a self,
        event: &'a Event,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Query("injected failure".to_string()));
            }
            self.events.write().unwrap().push(event.clone());
            Ok(())
        })
    }
}

//! Privileged-user caches and the loops that refresh them.
//!
//! Each [`Cache`] holds an `Arc` of a complete map. A refresh builds a new map
//! off to the side and swaps the `Arc` under a short write lock, so a reader
//! either sees the previous map in full or the new one in full. Readers clone
//! the `Arc` ([`Cache::snapshot`]) and hold no lock afterwards.
//!
//! A [`CacheRefresher`] owns one cache: [`CacheRefresher::load_once`] is the
//! blocking initial load done at startup, and its [`BackgroundTask`] impl
//! reloads whenever the refresh interval has elapsed, checking about once a
//! second. A failed load is logged and the previous snapshot stays in place.

use crate::lifecycle::{BackgroundTask, TaskExit};
use crate::metrics::CacheMetrics;
use serde_json::Value;
use showrunner_core::{
    CacheSnapshots, CustomActions, Snapshot, StopSignal, StoreError, UserDirectory, UserFlag,
    UserRecord,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// A map that is only ever replaced wholesale.
#[derive(Debug)]
pub struct Cache<V> {
    current: Arc<RwLock<Snapshot<V>>>,
}

impl<V> Cache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<V> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the whole map and returns its size.
    pub fn replace(&self, entries: HashMap<String, V>) -> usize {
        let size = entries.len();
        let fresh = Arc::new(entries);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = fresh;
        size
    }

    /// Number of entries in the current snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the current snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three caches handlers consult.
#[derive(Debug, Clone, Default)]
pub struct Caches {
    /// VIP username → entrance audio file.
    pub vip: Cache<String>,
    /// Admin usernames.
    pub admin: Cache<bool>,
    /// Custom-action username → trigger map.
    pub actions: Cache<CustomActions>,
}

impl Caches {
    /// Snapshots all three caches for one event.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshots {
        CacheSnapshots {
            vip: self.vip.snapshot(),
            admin: self.admin.snapshot(),
            actions: self.actions.snapshot(),
        }
    }
}

/// Extracts a cache value from a user record; `None` skips the record.
pub type Extractor<V> = fn(&UserRecord) -> Option<V>;

/// Default interval between reloads.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// How often the refresh loop checks whether a reload is due.
pub const DEFAULT_CHECK_TICK: Duration = Duration::from_secs(1);

/// Keeps one [`Cache`] in sync with the user directory.
pub struct CacheRefresher<V> {
    name: &'static str,
    flag: UserFlag,
    directory: Arc<dyn UserDirectory>,
    extract: Extractor<V>,
    cache: Cache<V>,
    interval: Duration,
    tick: Duration,
}

impl<V> std::fmt::Debug for CacheRefresher<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRefresher")
            .field("name", &self.name)
            .field("flag", &self.flag)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl<V: Send + Sync + 'static> CacheRefresher<V> {
    /// Creates a refresher for users with `flag`, mapped through `extract`.
    #[must_use]
    pub fn new(
        name: &'static str,
        flag: UserFlag,
        directory: Arc<dyn UserDirectory>,
        extract: Extractor<V>,
        cache: Cache<V>,
    ) -> Self {
        Self {
            name,
            flag,
            directory,
            extract,
            cache,
            interval: DEFAULT_REFRESH_INTERVAL,
            tick: DEFAULT_CHECK_TICK,
        }
    }

    /// Sets the refresh interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how often the loop checks whether a reload is due.
    #[must_use]
    pub const fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// The cache this refresher writes to.
    #[must_use]
    pub const fn cache(&self) -> &Cache<V> {
        &self.cache
    }

    /// Queries the directory and swaps in the result.
    ///
    /// Returns the number of cached users.
    ///
    /// # Errors
    ///
    /// Returns the directory's [`StoreError`]; the previous snapshot is kept.
    pub async fn load_once(&self) -> Result<usize, StoreError> {
        let started = Instant::now();
        match self.directory.find_active(self.flag).await {
            Ok(records) => {
                let total = records.len();
                let entries: HashMap<String, V> = records
                    .iter()
                    .filter_map(|record| {
                        (self.extract)(record).map(|value| (record.username.clone(), value))
                    })
                    .collect();
                let skipped = total - entries.len();
                let size = self.cache.replace(entries);

                CacheMetrics::record_load(self.name, size);
                if skipped > 0 {
                    tracing::warn!(cache = self.name, skipped, "Skipped user records without a usable value");
                }
                tracing::info!(
                    cache = self.name,
                    users = size,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Cache loaded"
                );
                Ok(size)
            },
            Err(err) => {
                CacheMetrics::record_failure(self.name);
                tracing::error!(
                    cache = self.name,
                    error = %err,
                    kept = self.cache.len(),
                    "Cache load failed, keeping previous snapshot"
                );
                Err(err)
            },
        }
    }

    async fn refresh_until_stopped(&self, stop: StopSignal) -> TaskExit {
        let mut last_load = Instant::now();
        loop {
            if stop.sleep(self.tick).await {
                break;
            }
            if last_load.elapsed() > self.interval {
                if let Err(e) = self.load_once().await {
                    tracing::debug!(cache = self.name, error = %e, "Keeping previous snapshot");
                }
                last_load = Instant::now();
            }
        }
        tracing::debug!(cache = self.name, "Cache refresher stopped");
        TaskExit::Stopped
    }
}

impl CacheRefresher<String> {
    /// VIP users and their entrance audio file (`audio_file`).
    #[must_use]
    pub fn vip(directory: Arc<dyn UserDirectory>, cache: Cache<String>) -> Self {
        Self::new("vip", UserFlag::Vip, directory, vip_audio_file, cache)
    }
}

impl CacheRefresher<bool> {
    /// Admin users.
    #[must_use]
    pub fn admin(directory: Arc<dyn UserDirectory>, cache: Cache<bool>) -> Self {
        Self::new("admin", UserFlag::Admin, directory, |_| Some(true), cache)
    }
}

impl CacheRefresher<CustomActions> {
    /// Custom-action users and their trigger maps (`actions`).
    #[must_use]
    pub fn custom_actions(directory: Arc<dyn UserDirectory>, cache: Cache<CustomActions>) -> Self {
        Self::new("action", UserFlag::Action, directory, custom_action_map, cache)
    }
}

fn vip_audio_file(record: &UserRecord) -> Option<String> {
    record
        .document
        .get("audio_file")
        .and_then(Value::as_str)
        .filter(|file| !file.is_empty())
        .map(str::to_string)
}

fn custom_action_map(record: &UserRecord) -> Option<CustomActions> {
    let triggers = record.document.get("actions")?.as_object()?;
    let actions: CustomActions = triggers
        .iter()
        .map(|(trigger, action)| {
            let action = match action {
                Value::String(name) => name.clone(),
                other => other.to_string(),
            };
            (trigger.clone(), action)
        })
        .collect();
    Some(actions)
}

impl<V: Send + Sync + 'static> BackgroundTask for CacheRefresher<V> {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, stop: StopSignal) -> Pin<Box<dyn Future<Output = TaskExit> + Send + '_>> {
        Box::pin(self.refresh_until_stopped(stop))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn record(doc: Value) -> UserRecord {
        UserRecord::from_document(doc).unwrap()
    }

    #[test]
    fn replace_swaps_the_whole_map() {
        let cache: Cache<bool> = Cache::new();
        let before = cache.snapshot();

        cache.replace(HashMap::from([("alice".to_string(), true)]));

        assert!(before.is_empty());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot().get("alice"), Some(&true));
    }

    #[test]
    fn caches_snapshot_reads_every_cache() {
        let caches = Caches::default();
        caches
            .vip
            .replace(HashMap::from([("bob".to_string(), "bob.mp3".to_string())]));
        caches.admin.replace(HashMap::from([("carol".to_string(), true)]));

        let snapshots = caches.snapshot();

        assert_eq!(snapshots.vip_audio("bob"), Some("bob.mp3"));
        assert!(snapshots.is_admin("carol"));
        assert!(snapshots.actions.is_empty());
    }

    #[test]
    fn vip_extractor_needs_an_audio_file() {
        let with_file = record(json!({ "username": "bob", "audio_file": "bob.mp3" }));
        let without = record(json!({ "username": "eve" }));
        let empty = record(json!({ "username": "mal", "audio_file": "" }));

        assert_eq!(vip_audio_file(&with_file), Some("bob.mp3".to_string()));
        assert_eq!(vip_audio_file(&without), None);
        assert_eq!(vip_audio_file(&empty), None);
    }

    #[test]
    fn action_extractor_stringifies_values() {
        let doc = record(json!({
            "username": "dave",
            "actions": { "!lights": "toggle_lights", "!count": 3 }
        }));

        let actions = custom_action_map(&doc).unwrap();

        assert_eq!(actions.get("!lights").map(String::as_str), Some("toggle_lights"));
        assert_eq!(actions.get("!count").map(String::as_str), Some("3"));
        assert!(custom_action_map(&record(json!({ "username": "x" }))).is_none());
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let cache: Cache<usize> = Cache::new();
        let generation = |g: usize| (0..50).map(|i| (format!("user{i}"), g)).collect::<HashMap<_, _>>();
        cache.replace(generation(0));

        std::thread::scope(|scope| {
            let writer = cache.clone();
            scope.spawn(move || {
                for g in 1..200 {
                    writer.replace(generation(g));
                }
            });

            for _ in 0..4 {
                let reader = cache.clone();
                scope.spawn(move || {
                    for _ in 0..500 {
                        let snapshot = reader.snapshot();
                        assert_eq!(snapshot.len(), 50);
                        let first = snapshot.values().next().copied().unwrap();
                        assert!(snapshot.values().all(|g| *g == first));
                    }
                });
            }
        });
    }
}

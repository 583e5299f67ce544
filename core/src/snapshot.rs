//! Read-only views of the privileged-user caches.
//!
//! A snapshot is an `Arc` of a complete map. Refreshers build a new map and
//! swap it in; readers clone the `Arc` and keep a consistent view for as long
//! as they hold it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A complete, immutable cache map keyed by username.
pub type Snapshot<V> = Arc<HashMap<String, V>>;

/// Trigger phrase → action name, as configured for one custom-action user.
pub type CustomActions = BTreeMap<String, String>;

/// The cache snapshots a handler sees for one event.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshots {
    /// VIP username → entrance audio file.
    pub vip: Snapshot<String>,
    /// Admin usernames.
    pub admin: Snapshot<bool>,
    /// Custom-action username → trigger map.
    pub actions: Snapshot<CustomActions>,
}

impl CacheSnapshots {
    /// The entrance audio file of a VIP user.
    #[must_use]
    pub fn vip_audio(&self, username: &str) -> Option<&str> {
        self.vip.get(username).map(String::as_str)
    }

    /// Whether the user is an active admin.
    #[must_use]
    pub fn is_admin(&self, username: &str) -> bool {
        self.admin.get(username).copied().unwrap_or(false)
    }

    /// The trigger map of a custom-action user.
    #[must_use]
    pub fn actions_for(&self, username: &str) -> Option<&CustomActions> {
        self.actions.get(username)
    }
}

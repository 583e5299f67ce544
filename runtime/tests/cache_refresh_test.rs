//! Cache refreshers against the in-memory user directory.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use showrunner_runtime::{Cache, CacheRefresher, Caches, LifecycleCoordinator};
use showrunner_testing::{InMemoryUserDirectory, wait_until};
use std::sync::Arc;
use std::time::Duration;

fn directory() -> InMemoryUserDirectory {
    let directory = InMemoryUserDirectory::new();
    directory.set_users(vec![
        json!({ "username": "bob", "vip": true, "active": true, "audio_file": "bob.mp3" }),
        json!({ "username": "eve", "vip": true, "active": false, "audio_file": "eve.mp3" }),
        json!({ "username": "carol", "admin": true, "active": true }),
        json!({ "username": "dave", "action": true, "active": true,
                "actions": { "!lights": "toggle_lights" } }),
    ]);
    directory
}

#[tokio::test]
async fn initial_load_fills_each_cache_with_active_flagged_users() {
    let directory = Arc::new(directory());
    let caches = Caches::default();

    let vip = CacheRefresher::vip(directory.clone(), caches.vip.clone());
    let admin = CacheRefresher::admin(directory.clone(), caches.admin.clone());
    let actions = CacheRefresher::custom_actions(directory, caches.actions.clone());

    assert_eq!(vip.load_once().await.unwrap(), 1);
    assert_eq!(admin.load_once().await.unwrap(), 1);
    assert_eq!(actions.load_once().await.unwrap(), 1);

    let snapshots = caches.snapshot();
    assert_eq!(snapshots.vip_audio("bob"), Some("bob.mp3"));
    assert_eq!(snapshots.vip_audio("eve"), None);
    assert!(snapshots.is_admin("carol"));
    assert!(snapshots.actions_for("dave").unwrap().contains_key("!lights"));
}

#[tokio::test]
async fn failed_load_keeps_the_previous_snapshot() {
    let directory = Arc::new(directory());
    let cache: Cache<String> = Cache::new();
    let refresher = CacheRefresher::vip(directory.clone(), cache.clone());
    refresher.load_once().await.unwrap();
    let before = cache.snapshot();

    directory.fail_next(1);
    let result = refresher.load_once().await;

    assert!(result.is_err());
    assert_eq!(*cache.snapshot(), *before);
    assert_eq!(cache.snapshot().get("bob").map(String::as_str), Some("bob.mp3"));
}

#[tokio::test]
async fn refresh_loop_picks_up_changes_and_survives_errors() {
    let directory = Arc::new(directory());
    let cache: Cache<bool> = Cache::new();
    let refresher = CacheRefresher::admin(directory.clone(), cache.clone())
        .with_interval(Duration::from_millis(20))
        .with_tick(Duration::from_millis(5));
    refresher.load_once().await.unwrap();

    let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(1));
    coordinator.register(Arc::new(refresher));
    coordinator.run().unwrap();

    directory.set_failing(true);
    let queries_before = directory.queries();
    assert!(wait_until(Duration::from_secs(5), || directory.queries() >= queries_before + 2).await);
    assert_eq!(cache.len(), 1);

    directory.set_failing(false);
    directory.insert(json!({ "username": "frank", "admin": true, "active": true }));
    assert!(wait_until(Duration::from_secs(5), || cache.len() == 2).await);

    let report = coordinator.stop().await;
    assert_eq!(report.joined, vec!["admin".to_string()]);
}

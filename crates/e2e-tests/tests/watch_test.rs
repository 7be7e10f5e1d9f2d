//! Watch E2E tests.
//!
//! Live changes trigger full passes, bursts collapse into few passes,
//! invalidations prefetch content and detaching stops future passes.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use archive_types::IndexEvent;
use e2e_tests::{archive, settle, wait_for, write_posts, TestHarness};

#[tokio::test]
async fn test_watched_source_follows_changes() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    harness.indexer.add_source(alice.clone(), true).await.unwrap();
    assert!(harness.indexer.is_watching("mem://alice"));

    let mut rx = harness.indexer.subscribe();
    alice.put_json("/posts/1.json", &json!({"title": "one"}));
    wait_for(&mut rx, |e| matches!(e, IndexEvent::IndexesUpdated { version: 1, .. })).await;
    assert!(harness.record("posts", "mem://alice", "/posts/1.json").is_some());

    alice.delete("/posts/1.json");
    wait_for(&mut rx, |e| matches!(e, IndexEvent::IndexesUpdated { version: 2, .. })).await;
    assert!(harness.record("posts", "mem://alice", "/posts/1.json").is_none());
    assert_eq!(harness.cursor("mem://alice"), Some(2));
}

#[tokio::test]
async fn test_burst_of_changes_collapses() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    harness.indexer.add_source(alice.clone(), true).await.unwrap();

    let mut rx = harness.indexer.subscribe();
    write_posts(&alice, 20);

    let events = wait_for(&mut rx, |e| {
        matches!(e, IndexEvent::IndexesUpdated { version: 20, .. })
    })
    .await;

    assert_eq!(harness.count("posts"), 20);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, IndexEvent::IndexesUpdated { .. }))
            .count(),
        1
    );
    assert_eq!(alice.history_calls(), 1);
}

#[tokio::test]
async fn test_invalidation_prefetches_content() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    harness.indexer.add_source(alice.clone(), true).await.unwrap();

    alice.invalidate("/posts/remote.json");
    tokio::time::timeout(Duration::from_secs(5), async {
        while alice.downloads().is_empty() {
            settle().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(alice.downloads(), vec!["/posts/remote.json".to_string()]);
    assert_eq!(alice.history_calls(), 0);
}

#[tokio::test]
async fn test_unwatch_stops_future_passes() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    write_posts(&alice, 2);
    harness.indexer.add_source(alice.clone(), true).await.unwrap();

    assert!(harness.indexer.unwatch("mem://alice"));
    assert!(!harness.indexer.unwatch("mem://alice"));
    settle().await;

    alice.put_json("/posts/9.json", &json!({"title": "unseen"}));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.cursor("mem://alice"), Some(2));
    assert_eq!(harness.count("posts"), 2);
    assert_eq!(alice.watcher_count(), 0);

    // Manual passes still work
    harness.indexer.sync_source("mem://alice").await.unwrap();
    assert_eq!(harness.count("posts"), 3);

    // Watching again picks up where the cursor is
    assert!(harness.indexer.watch("mem://alice").await.unwrap());
    let mut rx = harness.indexer.subscribe();
    alice.put_json("/posts/10.json", &json!({"title": "seen"}));
    wait_for(&mut rx, |e| matches!(e, IndexEvent::IndexesUpdated { version: 4, .. })).await;
    assert_eq!(harness.count("posts"), 4);
}

#[tokio::test]
async fn test_close_detaches_every_watch() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    let bob = archive("mem://bob");
    harness.indexer.add_source(alice.clone(), true).await.unwrap();
    harness.indexer.add_source(bob.clone(), true).await.unwrap();

    harness.indexer.close();
    assert!(!harness.indexer.is_watching("mem://alice"));
    assert!(!harness.indexer.is_watching("mem://bob"));

    alice.put_json("/posts/1.json", &json!({"title": "late"}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.count("posts"), 0);
    assert_eq!(alice.watcher_count(), 0);
    assert_eq!(bob.watcher_count(), 0);
}

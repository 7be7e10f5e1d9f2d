//! Synchronization E2E tests.
//!
//! A pass brings every table in line with the source at its current version,
//! is a no-op when repeated, applies only deltas afterwards and removes
//! records whose content stops validating.

use pretty_assertions::assert_eq;
use serde_json::json;

use archive_indexing::{IndexingError, SyncOutcome};
use archive_types::IndexEvent;
use e2e_tests::{
    archive, default_tables, drain_events, event_names, mutation_count, write_posts, TestHarness,
};

#[tokio::test]
async fn test_full_sync_reflects_source_at_current_version() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    write_posts(&alice, 3);
    alice.put_json("/comments/1.json", &json!({"text": "nice"}));
    alice.put_json("/posts/1.json", &json!({"title": "edited"}));
    alice.put_json("/readme.json", &json!({"title": "unmatched"}));

    let outcome = harness.indexer.add_source(alice.clone(), false).await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Updated {
            from: 0,
            to: 6,
            applied: 4
        }
    );
    assert_eq!(harness.cursor("mem://alice"), Some(alice.version()));
    assert_eq!(harness.count("posts"), 3);
    assert_eq!(harness.count("comments"), 1);
    assert_eq!(
        harness.record("posts", "mem://alice", "/posts/1.json"),
        Some(json!({"title": "edited"}))
    );

    let record = harness
        .indexer
        .get_record("posts", "mem://alice/posts/0.json")
        .unwrap()
        .unwrap();
    assert_eq!(record.origin, "mem://alice");
}

#[tokio::test]
async fn test_second_sync_produces_no_mutations() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    write_posts(&alice, 5);
    harness.indexer.add_source(alice.clone(), false).await.unwrap();

    let mut rx = harness.indexer.subscribe();
    let outcome = harness.indexer.sync_source("mem://alice").await.unwrap();

    assert_eq!(outcome, SyncOutcome::UpToDate { version: 5 });
    let events = drain_events(&mut rx);
    assert_eq!(mutation_count(&events), 0);
    assert_eq!(event_names(&events), vec!["source-indexed"]);
    assert_eq!(alice.history_calls(), 1);
}

#[tokio::test]
async fn test_incremental_sync_applies_only_new_changes() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    write_posts(&alice, 3);
    harness.indexer.add_source(alice.clone(), false).await.unwrap();

    alice.put_json("/posts/3.json", &json!({"title": "fresh"}));
    alice.delete("/posts/0.json");

    let mut rx = harness.indexer.subscribe();
    let outcome = harness.indexer.sync_source("mem://alice").await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Updated {
            from: 3,
            to: 5,
            applied: 2
        }
    );

    let events = drain_events(&mut rx);
    assert_eq!(
        event_names(&events),
        vec!["put-record", "del-record", "source-indexed", "indexes-updated"]
    );
    assert_eq!(harness.count("posts"), 3);
    assert!(harness.record("posts", "mem://alice", "/posts/0.json").is_none());
}

#[tokio::test]
async fn test_revalidation_failure_removes_stale_record() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    alice.put_json("/posts/1.json", &json!({"title": "valid"}));
    harness.indexer.add_source(alice.clone(), false).await.unwrap();
    assert!(harness.record("posts", "mem://alice", "/posts/1.json").is_some());

    alice.put_json("/posts/1.json", &json!({"body": "title dropped"}));
    let mut rx = harness.indexer.subscribe();
    harness.indexer.sync_source("mem://alice").await.unwrap();

    assert!(harness.record("posts", "mem://alice", "/posts/1.json").is_none());
    assert_eq!(
        drain_events(&mut rx)[0],
        IndexEvent::DelRecord {
            table: "posts".to_string(),
            url: "mem://alice/posts/1.json".to_string(),
            origin: "mem://alice".to_string(),
        }
    );
}

#[tokio::test]
async fn test_parse_failure_aborts_batch_and_resumes_after_fix() {
    let harness = TestHarness::new();
    let mut rx = harness.indexer.subscribe();
    let alice = archive("mem://alice");
    alice.put_json("/posts/a.json", &json!({"title": "a"}));
    alice.put_bytes("/posts/b.json", "{ not json");
    alice.put_json("/posts/c.json", &json!({"title": "c"}));

    let err = harness
        .indexer
        .add_source(alice.clone(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexingError::Parse { .. }));
    assert!(!harness.indexer.is_retrying("mem://alice"));

    // Only the change before the failure is applied
    assert_eq!(harness.cursor("mem://alice"), Some(1));
    assert!(harness.record("posts", "mem://alice", "/posts/a.json").is_some());
    assert!(harness.record("posts", "mem://alice", "/posts/c.json").is_none());

    let events = drain_events(&mut rx);
    assert!(matches!(events.last(), Some(IndexEvent::SourceError { .. })));

    alice.put_json("/posts/b.json", &json!({"title": "b"}));
    let outcome = harness.indexer.sync_source("mem://alice").await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Updated {
            from: 1,
            to: 4,
            applied: 2
        }
    );
    assert_eq!(harness.count("posts"), 3);
}

#[tokio::test]
async fn test_cursor_survives_reopen() {
    let mut harness = TestHarness::new();
    let alice = archive("mem://alice");
    write_posts(&alice, 4);
    harness.indexer.add_source(alice.clone(), false).await.unwrap();

    harness.reopen(default_tables(1));
    let outcome = harness.indexer.add_source(alice.clone(), false).await.unwrap();
    assert_eq!(outcome, SyncOutcome::UpToDate { version: 4 });
    assert_eq!(alice.history_calls(), 1);

    alice.put_json("/posts/9.json", &json!({"title": "late"}));
    let outcome = harness.indexer.sync_source("mem://alice").await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Updated {
            from: 4,
            to: 5,
            applied: 1
        }
    );
}

#[tokio::test]
async fn test_record_queries_by_origin() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    let bob = archive("mem://bob");
    write_posts(&alice, 2);
    write_posts(&bob, 3);
    harness.indexer.add_source(alice, false).await.unwrap();
    harness.indexer.add_source(bob, false).await.unwrap();

    assert_eq!(harness.count("posts"), 5);
    assert_eq!(
        harness
            .indexer
            .list_records_by_origin("posts", "mem://bob")
            .unwrap()
            .len(),
        3
    );
    assert_eq!(
        harness.indexer.tracked_sources(),
        vec!["mem://alice".to_string(), "mem://bob".to_string()]
    );
}

#[tokio::test]
async fn test_never_valid_file_emits_no_delete() {
    let harness = TestHarness::new();
    let alice = archive("mem://alice");
    alice.put_json("/posts/1.json", &json!({"body": "never titled"}));
    harness.indexer.add_source(alice.clone(), false).await.unwrap();
    assert_eq!(harness.count("posts"), 0);

    alice.delete("/posts/1.json");
    let mut rx = harness.indexer.subscribe();
    harness.indexer.sync_source("mem://alice").await.unwrap();

    let events = drain_events(&mut rx);
    assert_eq!(mutation_count(&events), 0);
    assert_eq!(event_names(&events), vec!["source-indexed", "indexes-updated"]);
}

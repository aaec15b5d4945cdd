//! Integration tests for the merge step.

use crate::integration::common::{ScriptedProvider, date, march, record_for, service, universe};
use sheaf_core::storage::{get_json, set_json};
use sheaf_core::traits::KvStore;
use sheaf_core::{
    BatchRecord, Cursor, InvocationOutcome, MemoryStore, MergedSnapshot, Record, SilentReporter,
    WindowOverride,
};

async fn seed_batch(store: &MemoryStore, start: usize, items: Vec<Record>) {
    let batch = BatchRecord {
        batch_start: start,
        batch_size: items.len(),
        generated_at: march(1),
        items,
        failures: vec![],
    };
    set_json(store, &format!("harvest:batch:{start}"), &batch, None)
        .await
        .unwrap();
}

async fn seed_cursor(store: &MemoryStore, offset: usize) {
    let cursor = Cursor {
        offset,
        cycle_date: date(1),
        version: 1,
        completed_cycle: None,
    };
    set_json(store, "harvest:cursor", &cursor, None).await.unwrap();
}

/// Two independent runs over the same universe and clock publish
/// byte-identical snapshots.
#[tokio::test]
async fn test_merge_is_deterministic() {
    let mut published = vec![];
    for _ in 0..2 {
        // Arrange
        let store = MemoryStore::new();
        let service = service(store.clone(), ScriptedProvider::new(), 4);
        let universe = universe(10);

        // Act
        for _ in 0..4 {
            service
                .run_invocation_with_progress(
                    &universe,
                    WindowOverride::default(),
                    &SilentReporter,
                    march(1),
                )
                .await
                .unwrap();
        }
        published.push(store.get("harvest:latest").await.unwrap().unwrap());
    }

    // Assert
    assert_eq!(published[0], published[1]);
}

/// An identifier present in two slots keeps the lower `batch_start` copy.
#[tokio::test]
async fn test_dedup_lower_batch_start_wins() {
    // Arrange
    let store = MemoryStore::new();
    let mut stale = record_for("SYM001");
    stale.metrics.insert("price".to_string(), -1.0);
    seed_batch(&store, 2, vec![stale, record_for("SYM002")]).await;
    seed_batch(&store, 0, vec![record_for("SYM000"), record_for("SYM001")]).await;
    seed_cursor(&store, 4).await;
    let service = service(store.clone(), ScriptedProvider::new(), 2);

    // Act
    let outcome = service
        .run_invocation_with_progress(
            &universe(4),
            WindowOverride::default(),
            &SilentReporter,
            march(1),
        )
        .await
        .unwrap();

    // Assert
    assert!(matches!(outcome, InvocationOutcome::Merged { count: 3, .. }));
    let snapshot: MergedSnapshot = get_json(&store, "harvest:latest").await.unwrap().unwrap();
    let ids: Vec<&str> = snapshot.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["SYM000", "SYM001", "SYM002"]);
    assert_eq!(snapshot.items[1], record_for("SYM001"));
}

/// Missing slots are counted and skipped.
#[tokio::test]
async fn test_merge_skips_missing_slots() {
    // Arrange
    let store = MemoryStore::new();
    seed_batch(&store, 0, vec![record_for("SYM000"), record_for("SYM001")]).await;
    seed_batch(&store, 4, vec![record_for("SYM004")]).await;
    seed_cursor(&store, 5).await;
    let service = service(store.clone(), ScriptedProvider::new(), 2);

    // Act
    let outcome = service
        .run_invocation_with_progress(
            &universe(5),
            WindowOverride::default(),
            &SilentReporter,
            march(1),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(
        outcome,
        InvocationOutcome::Merged {
            cycle: date(1),
            count: 3,
            part_count: 2,
            missing_parts: 1,
        }
    );
    let snapshot: MergedSnapshot = get_json(&store, "harvest:latest").await.unwrap().unwrap();
    assert_eq!(snapshot.missing_parts, 1);
    assert_eq!(snapshot.generated_at, march(1));
}

/// With no slot at all the merge publishes nothing and keeps the cursor.
#[tokio::test]
async fn test_merge_aborts_without_batches() {
    // Arrange
    let store = MemoryStore::new();
    seed_cursor(&store, 6).await;
    let service = service(store.clone(), ScriptedProvider::new(), 3);

    // Act
    let outcome = service
        .run_invocation_with_progress(
            &universe(6),
            WindowOverride::default(),
            &SilentReporter,
            march(1),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome, InvocationOutcome::MergeAborted { expected_parts: 2 });
    assert!(store.get("harvest:latest").await.unwrap().is_none());
    let cursor: Cursor = get_json(&store, "harvest:cursor").await.unwrap().unwrap();
    assert_eq!(cursor.offset, 6);
    assert!(cursor.completed_cycle.is_none());
    assert!(store.members("harvest:cycles").is_empty());
}

/// A forced merge mid-cycle publishes but leaves progress alone.
#[tokio::test]
async fn test_forced_merge_mid_cycle_keeps_cursor() {
    // Arrange
    let store = MemoryStore::new();
    let service = service(store.clone(), ScriptedProvider::new(), 5);
    let universe = universe(12);
    service
        .run_invocation_with_progress(
            &universe,
            WindowOverride::default(),
            &SilentReporter,
            march(1),
        )
        .await
        .unwrap();

    // Act
    let outcome = service
        .merge_with_progress(&universe, &SilentReporter, march(1))
        .await
        .unwrap();

    // Assert
    assert_eq!(
        outcome,
        InvocationOutcome::Merged {
            cycle: date(1),
            count: 5,
            part_count: 1,
            missing_parts: 2,
        }
    );
    let cursor: Cursor = get_json(&store, "harvest:cursor").await.unwrap().unwrap();
    assert_eq!(cursor.offset, 5);
    assert!(cursor.completed_cycle.is_none());
    assert_eq!(service.snapshot().await.unwrap().unwrap().count, 5);
}

/// A forced merge at the end of a cycle completes it like a natural one.
#[tokio::test]
async fn test_forced_merge_at_end_completes_cycle() {
    // Arrange
    let store = MemoryStore::new();
    let service = service(store.clone(), ScriptedProvider::new(), 5);
    let universe = universe(5);
    service
        .run_invocation_with_progress(
            &universe,
            WindowOverride::default(),
            &SilentReporter,
            march(1),
        )
        .await
        .unwrap();

    // Act
    service
        .merge_with_progress(&universe, &SilentReporter, march(1))
        .await
        .unwrap();

    // Assert
    let cursor: Cursor = get_json(&store, "harvest:cursor").await.unwrap().unwrap();
    assert_eq!(cursor.completed_cycle, Some(date(1)));
    assert_eq!(store.members("harvest:cycles"), vec!["2024-03-01"]);
}

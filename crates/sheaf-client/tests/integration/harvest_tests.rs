//! End-to-end invocations over the HTTP clients.

use chrono::{TimeZone, Utc};
use serde_json::json;
use sheaf_core::models::{Cursor, MergedSnapshot};
use sheaf_core::{
    HarvestConfig, HarvestService, InvocationOutcome, SilentReporter, Universe, WindowOverride,
};

use crate::integration::common::{
    MockState, kv_client, provider_config, quote_body, spawn, upstream_client,
};

/// Test 1: a five-item universe in batches of two, one item unknown to the
/// provider, runs to a published snapshot through the REST store.
#[tokio::test]
async fn test_full_cycle_over_http() {
    // Arrange
    let state = MockState::new();
    for (i, symbol) in ["A.US", "B.US", "C.US", "E.US"].iter().enumerate() {
        state.script_quote(symbol, vec![(200, quote_body(symbol, 10.0 + i as f64))]);
    }
    let base_url = spawn(state.clone()).await;
    let service = HarvestService::with_config(
        kv_client(&base_url, 0),
        upstream_client(&provider_config(&base_url, &["US"]), 0),
        HarvestConfig {
            batch_size: 2,
            concurrency: 2,
            ..Default::default()
        },
    );
    let universe = Universe::new(["A", "B", "C", "D", "E"]).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    // Act
    let mut labels = vec![];
    for _ in 0..4 {
        let outcome = service
            .run_invocation_with_progress(
                &universe,
                WindowOverride::default(),
                &SilentReporter,
                now,
            )
            .await
            .unwrap();
        labels.push(outcome.label());
    }

    // Assert
    assert_eq!(labels, ["committed", "committed", "committed", "merged"]);

    let snapshot: MergedSnapshot =
        serde_json::from_str(&state.value("harvest:latest").unwrap()).unwrap();
    let ids: Vec<&str> = snapshot.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["A", "B", "C", "E"]);
    assert_eq!(snapshot.part_count, 3);

    let cursor: Cursor = serde_json::from_str(&state.value("harvest:cursor").unwrap()).unwrap();
    assert_eq!(cursor.offset, 5);
    assert_eq!(cursor.completed_cycle, Some(now.date_naive()));

    // Batch status keys expire; batch records do not by default.
    assert_eq!(state.ttl("harvest:status:0"), Some(3600));
    assert_eq!(state.ttl("harvest:batch:0"), None);

    let outcome = service
        .run_invocation_with_progress(&universe, WindowOverride::default(), &SilentReporter, now)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        InvocationOutcome::Idle {
            cycle: now.date_naive()
        }
    );
}

/// Test 2: a rate-limited provider leaves the cursor where it was.
#[tokio::test]
async fn test_rate_limited_batch_keeps_cursor() {
    // Arrange
    let state = MockState::new();
    state.script_quote("A.US", vec![(200, quote_body("A", 1.0))]);
    state.script_quote("B.US", vec![(429, json!({"error": "slow down"}))]);
    let base_url = spawn(state.clone()).await;
    let service = HarvestService::with_config(
        kv_client(&base_url, 0),
        upstream_client(&provider_config(&base_url, &["US"]), 1),
        HarvestConfig {
            batch_size: 2,
            ..Default::default()
        },
    );
    let universe = Universe::new(["A", "B", "C"]).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    // Act
    let outcome = service
        .run_invocation_with_progress(&universe, WindowOverride::default(), &SilentReporter, now)
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.label(), "rejected");
    assert!(state.value("harvest:batch:0").is_none());
    let cursor: Cursor = serde_json::from_str(&state.value("harvest:cursor").unwrap()).unwrap();
    assert_eq!(cursor.offset, 0);
}

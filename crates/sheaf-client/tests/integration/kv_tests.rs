//! Integration tests for KvRestClient.

use std::time::Duration;

use crate::integration::common::{MockState, RawReply, TOKEN, kv_client, spawn, spawn_raw};
use sheaf_client::KvRestClient;
use sheaf_core::config::HttpConfig;
use sheaf_core::retry::RetryPolicy;
use sheaf_core::traits::KvStore;
use sheaf_core::AppError;
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;
use tokio::time::Instant;

/// Test 1: values written with a TTL come back and carry `EX`.
#[tokio::test]
async fn test_set_then_get_with_ttl() {
    // Arrange
    let state = MockState::new();
    let kv = kv_client(&spawn(state.clone()).await, 0);

    // Act
    kv.set("harvest:status:0", r#"{"ok":true}"#, Some(Duration::from_secs(3600)))
        .await
        .unwrap();
    let value = kv.get("harvest:status:0").await.unwrap();

    // Assert
    assert_eq!(value.as_deref(), Some(r#"{"ok":true}"#));
    assert_eq!(state.ttl("harvest:status:0"), Some(3600));
}

/// Test 2: a write without TTL sends no `EX`, and missing keys read as None.
#[tokio::test]
async fn test_set_without_ttl_and_missing_key() {
    // Arrange
    let state = MockState::new();
    let kv = kv_client(&spawn(state.clone()).await, 0);

    // Act
    kv.set("harvest:cursor", "{}", None).await.unwrap();
    let missing = kv.get("harvest:nothing").await.unwrap();

    // Assert
    assert_eq!(state.value("harvest:cursor").as_deref(), Some("{}"));
    assert_eq!(state.ttl("harvest:cursor"), None);
    assert!(missing.is_none());
}

/// Test 3: set membership is reported only for new members.
#[tokio::test]
async fn test_add_to_set_reports_new_members() {
    // Arrange
    let state = MockState::new();
    let kv = kv_client(&spawn(state.clone()).await, 0);

    // Act
    let first = kv.add_to_set("harvest:cycles", "2024-03-01").await.unwrap();
    let second = kv.add_to_set("harvest:cycles", "2024-03-01").await.unwrap();

    // Assert
    assert!(first);
    assert!(!second);
}

/// Test 4: a rejected token is a permanent store error, not retried.
#[tokio::test]
async fn test_wrong_token_is_not_retried() {
    // Arrange
    let state = MockState::new();
    let base_url = spawn(state.clone()).await;
    let kv = KvRestClient::new(
        &base_url,
        "wrong",
        &HttpConfig::default(),
        RetryPolicy::immediate(3),
    )
    .unwrap();

    // Act
    let result = kv.get("harvest:cursor").await;

    // Assert
    match result {
        Err(AppError::StoreError(message)) => assert_eq!(message, "unauthorized"),
        other => panic!("expected StoreError, got {other:?}"),
    }
    assert_eq!(state.hits_for("/get/"), 1);
}

/// Test 5: server errors are retried until the store recovers.
#[tokio::test]
async fn test_server_errors_are_retried() {
    // Arrange
    let state = MockState::new();
    state.fail_kv(&[503, 500]);
    let kv = kv_client(&spawn(state.clone()).await, 2);

    // Act
    kv.set("k", "v", None).await.unwrap();

    // Assert
    assert_eq!(state.hits_for("/set/k"), 3);
    assert_eq!(state.value("k").as_deref(), Some("v"));
}

/// Test 6: a rate limit that outlasts the retry budget surfaces as such.
#[tokio::test]
async fn test_rate_limit_exhausts_retries() {
    // Arrange
    let state = MockState::new();
    state.fail_kv(&[429, 429, 429]);
    let kv = kv_client(&spawn(state.clone()).await, 1);

    // Act
    let result = kv.get("k").await;

    // Assert
    assert!(matches!(result, Err(AppError::RateLimitExceeded)));
    assert_eq!(state.hits_for("/get/k"), 2);
}

/// Test 7: an unreachable store is a network error.
#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let kv = kv_client(&format!("http://{addr}"), 1);

    // Act
    let result = kv.get("k").await;

    // Assert
    assert!(matches!(result, Err(AppError::NetworkError(_))));
}

/// Test 8: a 429 `Retry-After` replaces the exponential backoff.
#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    // Arrange
    let state = MockState::new();
    state.fail_kv(&[429]);
    state.set_retry_after("1");
    let policy = RetryPolicy {
        max_retries: 1,
        base_delay_ms: 10_000,
        max_delay_ms: 10_000,
        jitter_ms: 0,
    };
    let kv = KvRestClient::new(
        &spawn(state.clone()).await,
        TOKEN,
        &HttpConfig::default(),
        policy,
    )
    .unwrap();

    // Act
    let started = Instant::now();
    let result = kv.get("k").await;
    let waited = started.elapsed();

    // Assert
    assert_eq!(result.unwrap(), None);
    assert_eq!(state.hits_for("/get/k"), 2);
    assert!(waited >= Duration::from_secs(1), "waited {waited:?}");
    assert!(waited < Duration::from_secs(5), "waited {waited:?}");
}

/// Test 9: a connection closed before any response is retried.
#[tokio::test]
async fn test_dropped_connection_is_retried() {
    // Arrange
    let (url, connections) =
        spawn_raw(vec![RawReply::Drop, RawReply::Full], r#"{"result":"v"}"#).await;
    let kv = kv_client(&url, 2);

    // Act
    let value = kv.get("k").await;

    // Assert
    assert_eq!(value.unwrap().as_deref(), Some("v"));
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

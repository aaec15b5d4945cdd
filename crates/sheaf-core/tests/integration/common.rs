//! Test utilities and mock implementations for integration tests.
//!
//! Provides a scripted [`RecordProvider`] and a [`KvStore`] wrapper that can
//! be told to fail writes, for testing `HarvestService` in isolation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sheaf_core::traits::{KvStore, RecordProvider};
use sheaf_core::{
    AppError, FailureKind, FetchFailure, FetchResult, HarvestConfig, HarvestService, MemoryStore,
    Record, Universe,
};

// =============================================================================
// ScriptedProvider
// =============================================================================

/// Behaviour of the provider for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Script {
    Ok,
    NoData,
    RateLimited,
    Exception,
}

/// Provider that answers every identifier with a deterministic record unless
/// a script says otherwise.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: &str, script: Script) {
        self.scripts.lock().unwrap().insert(id.to_string(), script);
    }

    #[allow(dead_code)]
    pub fn clear_scripts(&self) {
        self.scripts.lock().unwrap().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }
}

/// The record the scripted provider returns for `id`.
pub fn record_for(id: &str) -> Record {
    Record {
        id: id.to_string(),
        symbol: format!("{id}.US"),
        name: Some(format!("{id} Holdings")),
        currency: Some("USD".to_string()),
        metrics: [("price".to_string(), id.len() as f64)].into_iter().collect(),
        fetched_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    }
}

impl RecordProvider for ScriptedProvider {
    async fn fetch_record(&self, id: &str) -> FetchResult {
        self.calls.lock().unwrap().push(id.to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(Script::Ok);

        match script {
            Script::Ok => Ok(record_for(id)),
            Script::NoData => Err(FetchFailure::new(id, FailureKind::NoData)
                .with_candidates(vec![format!("{id}.US")])),
            Script::RateLimited => Err(FetchFailure::new(id, FailureKind::RateLimited)
                .with_message("HTTP 429 after 5 attempts")),
            Script::Exception => Err(FetchFailure::new(id, FailureKind::Exception)
                .with_message("HTTP 503 after 5 attempts")),
        }
    }
}

// =============================================================================
// FlakyStore
// =============================================================================

/// Wraps [`MemoryStore`] and fails `set` for keys containing a marker.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_on: Arc<Mutex<Option<String>>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_containing(&self, marker: &str) {
        *self.fail_on.lock().unwrap() = Some(marker.to_string());
    }
}

impl KvStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let should_fail = self
            .fail_on
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|marker| key.contains(marker));
        if should_fail {
            return Err(AppError::StoreError(format!("injected failure for {key}")));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, AppError> {
        self.inner.add_to_set(key, member).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// A universe of `n` identifiers `SYM000`, `SYM001`, …
pub fn universe(n: usize) -> Universe {
    Universe::new((0..n).map(|i| format!("SYM{i:03}"))).unwrap()
}

/// Noon UTC on the given day of March 2024.
pub fn march(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

pub fn config(batch_size: usize) -> HarvestConfig {
    HarvestConfig {
        batch_size,
        concurrency: 4,
        ..Default::default()
    }
}

pub fn service<S: KvStore>(
    store: S,
    provider: ScriptedProvider,
    batch_size: usize,
) -> HarvestService<S, ScriptedProvider> {
    HarvestService::with_config(store, provider, config(batch_size))
}

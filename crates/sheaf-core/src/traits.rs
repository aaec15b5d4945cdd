//! Trait definitions for external dependencies.
//!
//! The harvester talks to exactly two things outside the process: a
//! key-value store that carries every byte of durable state, and an upstream
//! provider that answers per-item lookups. Both are abstracted here so the
//! orchestration in [`crate::harvest`] can be exercised against in-memory
//! doubles.
//!
//! # Example
//!
//! ```
//! use sheaf_core::traits::KvStore;
//! use sheaf_core::AppError;
//!
//! async fn read_cursor_raw<S: KvStore>(store: &S) -> Result<Option<String>, AppError> {
//!     store.get("harvest:cursor").await
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use crate::AppError;
use crate::models::FetchResult;

/// Minimal key-value store contract.
///
/// Values are opaque strings; callers serialize JSON themselves.
pub trait KvStore: Send + Sync + Clone {
    /// Reads a key. A missing (or expired) key is `Ok(None)`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Writes a key, replacing any previous value.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to write
    /// * `value` - Opaque string value
    /// * `ttl` - Expiry, or `None` to keep the value until overwritten
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Adds `member` to the set stored at `key`.
    ///
    /// Returns true if the member was not already present.
    fn add_to_set(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Upstream source of per-item records.
///
/// A fetch never returns an [`AppError`]: every way an item can fail is a
/// typed [`FetchFailure`](crate::models::FetchFailure) so that the worker
/// pool can keep going and the commit policy can classify the batch.
pub trait RecordProvider: Send + Sync + Clone {
    /// Fetches the canonical record for one work item.
    fn fetch_record(&self, id: &str) -> impl Future<Output = FetchResult> + Send;
}

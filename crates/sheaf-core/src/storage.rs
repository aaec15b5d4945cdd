//! Key layout and JSON helpers over a [`KvStore`].
//!
//! All keys share one prefix so several harvesters can live in the same
//! store:
//!
//! ```text
//! {prefix}:cursor            checkpoint (no TTL)
//! {prefix}:batch:{start}     committed batch record
//! {prefix}:status:{start}    diagnostic status of the latest attempt (short TTL)
//! {prefix}:status:last       copy of the most recent status, any slot
//! {prefix}:last-run          RFC 3339 timestamp of the last committed batch
//! {prefix}:latest            published snapshot
//! {prefix}:cycles            set of merged cycle dates
//! ```

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::AppError;
use crate::traits::KvStore;

/// Default key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "harvest";

/// Builds every key the harvester reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeyLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches(':').to_string();
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn cursor(&self) -> String {
        format!("{}:cursor", self.prefix)
    }

    pub fn batch(&self, batch_start: usize) -> String {
        format!("{}:batch:{}", self.prefix, batch_start)
    }

    pub fn status(&self, batch_start: usize) -> String {
        format!("{}:status:{}", self.prefix, batch_start)
    }

    pub fn last_status(&self) -> String {
        format!("{}:status:last", self.prefix)
    }

    pub fn last_run(&self) -> String {
        format!("{}:last-run", self.prefix)
    }

    pub fn latest(&self) -> String {
        format!("{}:latest", self.prefix)
    }

    pub fn cycles(&self) -> String {
        format!("{}:cycles", self.prefix)
    }
}

/// Reads and deserializes a JSON value.
///
/// Missing keys are `Ok(None)`; malformed JSON is a
/// [`AppError::SerializationError`].
pub async fn get_json<S, T>(store: &S, key: &str) -> Result<Option<T>, AppError>
where
    S: KvStore,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes and writes a JSON value.
pub async fn set_json<S, T>(
    store: &S,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), AppError>
where
    S: KvStore,
    T: Serialize + Sync,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}

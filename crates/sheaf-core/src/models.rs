//! Domain models persisted in the key-value store.
//!
//! Every type here is serialized as a JSON string value. Field names use
//! camelCase on the wire because the published snapshot is consumed by
//! readers outside this workspace.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Record
// =============================================================================

/// Canonical record for one work item.
///
/// Produced only by the provider client's mapping function; nothing else in
/// the workspace looks at the provider's raw response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Work-item identifier from the universe (the dedup key).
    pub id: String,
    /// Provider symbol that answered (`{id}.{suffix}` or `id` itself).
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Numeric metrics keyed by canonical metric name.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub fetched_at: DateTime<Utc>,
}

// =============================================================================
// Fetch failures
// =============================================================================

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Every candidate answered, none carried a usable payload.
    NoData,
    /// Rate limit persisted past the retry ceiling.
    RateLimited,
    /// Server errors, timeouts or transport failures past the retry ceiling.
    Exception,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoData => "no-data",
            FailureKind::RateLimited => "rate-limited",
            FailureKind::Exception => "exception",
        }
    }

    /// Merge two candidate-level outcomes. Rate limits dominate, then
    /// exceptions, then missing data.
    pub fn worst(self, other: FailureKind) -> FailureKind {
        use FailureKind::*;
        match (self, other) {
            (RateLimited, _) | (_, RateLimited) => RateLimited,
            (Exception, _) | (_, Exception) => Exception,
            _ => NoData,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure for one work item, with the candidates that were tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub id: String,
    pub kind: FailureKind,
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FetchFailure {
    pub fn new(id: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            id: id.into(),
            kind,
            candidates: Vec::new(),
            message: None,
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FailureKind::RateLimited
    }
}

/// Outcome of fetching one work item.
pub type FetchResult = Result<Record, FetchFailure>;

// =============================================================================
// Cursor
// =============================================================================

/// Durable position of the harvester inside the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Index of the next unprocessed work item.
    pub offset: usize,
    /// Calendar day this offset belongs to.
    pub cycle_date: NaiveDate,
    /// Incremented on every write.
    #[serde(default)]
    pub version: u64,
    /// Day whose cycle has already been merged and published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_cycle: Option<NaiveDate>,
}

impl Cursor {
    /// A fresh cursor at the start of `today`'s cycle.
    pub fn start_of(today: NaiveDate) -> Self {
        Self {
            offset: 0,
            cycle_date: today,
            version: 0,
            completed_cycle: None,
        }
    }

    /// Returns true when today's cycle was already merged.
    pub fn is_cycle_complete(&self, today: NaiveDate) -> bool {
        self.completed_cycle == Some(today)
    }
}

// =============================================================================
// Batch records
// =============================================================================

/// Result of one committed batch, stored under its `batch_start` slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_start: usize,
    pub batch_size: usize,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<Record>,
    #[serde(default)]
    pub failures: Vec<FetchFailure>,
}

/// Whether a batch attempt was committed or held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchDisposition {
    Committed,
    Rejected,
}

impl BatchDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchDisposition::Committed => "committed",
            BatchDisposition::Rejected => "rejected",
        }
    }
}

/// Short-lived diagnostic mirror of the latest attempt at a batch.
///
/// Written for every attempt, including rejected ones. The merge never
/// reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub batch_start: usize,
    pub batch_size: usize,
    pub attempted_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: bool,
    pub disposition: BatchDisposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// =============================================================================
// Snapshot
// =============================================================================

/// The unified, deduplicated dataset published to the `latest` key.
///
/// This is the only artifact snapshot readers consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedSnapshot {
    pub generated_at: DateTime<Utc>,
    pub universe_total: usize,
    /// Number of batch records that contributed.
    pub part_count: usize,
    /// Number of expected batch slots that were empty.
    #[serde(default)]
    pub missing_parts: usize,
    pub count: usize,
    pub items: Vec<Record>,
}

//! Response DTOs for API endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use sheaf_core::{BatchStatus, Cursor, HarvestStatus, InvocationOutcome, MergedSnapshot};

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "healthy" when the server answers
    pub status: String,
    /// Server version
    pub version: String,
    /// Store backend: "rest" or "memory"
    pub store: String,
}

// =============================================================================
// Invocation
// =============================================================================

/// Result of one invocation or forced merge.
///
/// `outcome` is one of `committed`, `rejected`, `merged`, `merge-aborted`,
/// `idle`; the other fields are present when they apply.
#[derive(Debug, Serialize, ToSchema)]
pub struct InvocationResponse {
    /// Identifier of this invocation, also attached to its log lines
    pub invocation_id: Uuid,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_advanced: Option<bool>,
    /// Why a batch was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Cycle date (YYYY-MM-DD) of a merge or idle outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_parts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_parts: Option<usize>,
}

impl InvocationResponse {
    fn empty(invocation_id: Uuid, outcome: &InvocationOutcome) -> Self {
        Self {
            invocation_id,
            outcome: outcome.label().to_string(),
            batch_start: None,
            batch_size: None,
            succeeded: None,
            failed: None,
            next_offset: None,
            cursor_advanced: None,
            reason: None,
            cycle: None,
            count: None,
            part_count: None,
            missing_parts: None,
            expected_parts: None,
        }
    }

    pub fn new(invocation_id: Uuid, outcome: InvocationOutcome) -> Self {
        let base = Self::empty(invocation_id, &outcome);
        match outcome {
            InvocationOutcome::Committed {
                batch_start,
                batch_size,
                succeeded,
                failed,
                next_offset,
                cursor_advanced,
            } => Self {
                batch_start: Some(batch_start),
                batch_size: Some(batch_size),
                succeeded: Some(succeeded),
                failed: Some(failed),
                next_offset: Some(next_offset),
                cursor_advanced: Some(cursor_advanced),
                ..base
            },
            InvocationOutcome::Rejected {
                batch_start,
                batch_size,
                succeeded,
                failed,
                reason,
            } => Self {
                batch_start: Some(batch_start),
                batch_size: Some(batch_size),
                succeeded: Some(succeeded),
                failed: Some(failed),
                reason: Some(reason.to_string()),
                ..base
            },
            InvocationOutcome::Merged {
                cycle,
                count,
                part_count,
                missing_parts,
            } => Self {
                cycle: Some(cycle.to_string()),
                count: Some(count),
                part_count: Some(part_count),
                missing_parts: Some(missing_parts),
                ..base
            },
            InvocationOutcome::MergeAborted { expected_parts } => Self {
                expected_parts: Some(expected_parts),
                ..base
            },
            InvocationOutcome::Idle { cycle } => Self {
                cycle: Some(cycle.to_string()),
                ..base
            },
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Checkpoint cursor.
#[derive(Debug, Serialize, ToSchema)]
pub struct CursorDto {
    pub offset: usize,
    /// Date (YYYY-MM-DD) of the cycle in progress
    pub cycle_date: String,
    pub version: u64,
    /// Last cycle date that was merged and published
    pub completed_cycle: Option<String>,
}

impl From<Cursor> for CursorDto {
    fn from(c: Cursor) -> Self {
        Self {
            offset: c.offset,
            cycle_date: c.cycle_date.to_string(),
            version: c.version,
            completed_cycle: c.completed_cycle.map(|d| d.to_string()),
        }
    }
}

/// Outcome of the most recent batch attempt.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchStatusDto {
    pub batch_start: usize,
    pub batch_size: usize,
    pub attempted_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: bool,
    /// "committed" or "rejected"
    pub disposition: String,
    pub reason: Option<String>,
}

impl From<BatchStatus> for BatchStatusDto {
    fn from(s: BatchStatus) -> Self {
        Self {
            batch_start: s.batch_start,
            batch_size: s.batch_size,
            attempted_at: s.attempted_at,
            succeeded: s.succeeded,
            failed: s.failed,
            rate_limited: s.rate_limited,
            disposition: s.disposition.as_str().to_string(),
            reason: s.reason,
        }
    }
}

/// Durable harvester state.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub cursor: Option<CursorDto>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_batch: Option<BatchStatusDto>,
}

impl From<HarvestStatus> for StatusResponse {
    fn from(s: HarvestStatus) -> Self {
        Self {
            cursor: s.cursor.map(CursorDto::from),
            last_run: s.last_run,
            last_batch: s.last_batch.map(BatchStatusDto::from),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Counts of the published snapshot without its records.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotSummaryResponse {
    pub generated_at: DateTime<Utc>,
    pub universe_total: usize,
    pub part_count: usize,
    pub missing_parts: usize,
    pub count: usize,
}

impl From<&MergedSnapshot> for SnapshotSummaryResponse {
    fn from(s: &MergedSnapshot) -> Self {
        Self {
            generated_at: s.generated_at,
            universe_total: s.universe_total,
            part_count: s.part_count,
            missing_parts: s.missing_parts,
            count: s.count,
        }
    }
}

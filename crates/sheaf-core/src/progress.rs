//! Progress reporting for harvest invocations.
//!
//! [`HarvestService`](crate::harvest::HarvestService) emits a
//! [`HarvestEvent`] at each lifecycle step. Front-ends pick a reporter:
//! [`TracingReporter`] for the CLI and server, [`SilentReporter`] for tests
//! and library callers.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::models::Cursor;
use crate::policy::RejectReason;

// =============================================================================
// Harvest Events
// =============================================================================

/// Events emitted during an invocation.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    /// Cursor loaded and checked against today's cycle.
    InvocationStarted {
        cursor: &'a Cursor,
        universe_total: usize,
    },
    /// The cursor belonged to an earlier day and was rewound.
    CycleReset { from: NaiveDate, to: NaiveDate },
    /// Today's cycle is already merged; nothing to do.
    Idle { cycle: NaiveDate },
    /// A batch window is about to be fetched.
    BatchStarted {
        batch_start: usize,
        batch_size: usize,
        manual: bool,
    },
    /// A batch was written and the cursor possibly advanced.
    BatchCommitted {
        batch_start: usize,
        succeeded: usize,
        failed: usize,
        next_offset: usize,
        cursor_advanced: bool,
    },
    /// A batch was held back; the cursor did not move.
    BatchRejected {
        batch_start: usize,
        succeeded: usize,
        failed: usize,
        reason: &'a RejectReason,
    },
    /// The merge began reading slots.
    MergeStarted {
        universe_total: usize,
        expected_parts: usize,
    },
    /// The merged snapshot was published.
    MergePublished {
        count: usize,
        part_count: usize,
        missing_parts: usize,
    },
    /// No batch slot was found; nothing was published.
    MergeAborted { expected_parts: usize },
}

// =============================================================================
// Reporter Trait
// =============================================================================

/// Trait for reporting harvest progress.
pub trait ProgressReporter: Send + Sync {
    /// Called when a harvest event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Silent reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Tracing-based reporter for CLI/server logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::InvocationStarted {
                cursor,
                universe_total,
            } => {
                info!(
                    offset = cursor.offset,
                    cycle = %cursor.cycle_date,
                    universe_total,
                    "Invocation started"
                );
            }
            HarvestEvent::CycleReset { from, to } => {
                info!(%from, %to, "Cycle reset");
            }
            HarvestEvent::Idle { cycle } => {
                info!(%cycle, "Cycle already merged, nothing to do");
            }
            HarvestEvent::BatchStarted {
                batch_start,
                batch_size,
                manual,
            } => {
                info!(batch_start, batch_size, manual, "Fetching batch");
            }
            HarvestEvent::BatchCommitted {
                batch_start,
                succeeded,
                failed,
                next_offset,
                cursor_advanced,
            } => {
                info!(
                    batch_start,
                    succeeded, failed, next_offset, cursor_advanced, "Batch committed"
                );
            }
            HarvestEvent::BatchRejected {
                batch_start,
                succeeded,
                failed,
                reason,
            } => {
                warn!(batch_start, succeeded, failed, %reason, "Batch rejected, cursor held");
            }
            HarvestEvent::MergeStarted {
                universe_total,
                expected_parts,
            } => {
                info!(universe_total, expected_parts, "Merging batches");
            }
            HarvestEvent::MergePublished {
                count,
                part_count,
                missing_parts,
            } => {
                if missing_parts > 0 {
                    warn!(count, part_count, missing_parts, "Snapshot published with gaps");
                } else {
                    info!(count, part_count, "Snapshot published");
                }
            }
            HarvestEvent::MergeAborted { expected_parts } => {
                warn!(expected_parts, "No batch records found, merge aborted");
            }
        }
    }
}

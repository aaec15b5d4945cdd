//! Harvest service - one invocation of the checkpointed batch harvester.
//!
//! # State machine
//!
//! ```text
//! LOAD_CURSOR → CHECK_CYCLE_RESET ─┬─ cycle merged today ───────────→ IDLE
//!                                  ├─ offset >= universe_total ──────→ MERGE
//!                                  └─ SLICE_BATCH → RUN_BATCH → CLASSIFY
//!                                        ├─ commit → write batch, status,
//!                                        │           last-run, cursor (last)
//!                                        └─ reject → write status only
//! ```
//!
//! Each invocation performs at most one batch or one merge and returns. The
//! caller (cron, `sheaf run`, the HTTP trigger) re-invokes on its own
//! schedule; the cursor in the key-value store is the only memory between
//! invocations.

use chrono::{DateTime, NaiveDate, Utc};

use crate::checkpoint::CheckpointManager;
use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::merge::{build_snapshot, collect_batches, expected_slots};
use crate::models::{BatchDisposition, BatchRecord, BatchStatus, Cursor, MergedSnapshot};
use crate::policy::{CommitDecision, CommitPolicy, RejectReason};
use crate::pool::run_batch;
use crate::progress::{HarvestEvent, ProgressReporter, SilentReporter};
use crate::storage::{KeyLayout, get_json, set_json};
use crate::traits::{KvStore, RecordProvider};
use crate::universe::Universe;

// =============================================================================
// Invocation inputs and outputs
// =============================================================================

/// Manual window override for recovery runs.
///
/// `offset` must be a multiple of the batch size and lie inside the
/// universe. `limit` is clamped to `[1, batch_size]`. An override run
/// commits its slot like any batch but only advances the cursor when the
/// window is exactly the one the cursor would have produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowOverride {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl WindowOverride {
    pub fn is_manual(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }

    /// Checks the parts of the override that do not depend on the cursor.
    fn validate(&self, batch_size: usize, universe_total: usize) -> Result<(), AppError> {
        if let Some(offset) = self.offset {
            if offset % batch_size != 0 {
                return Err(AppError::InvalidWindow(format!(
                    "offset {} is not a multiple of batch size {}",
                    offset, batch_size
                )));
            }
            if offset >= universe_total {
                return Err(AppError::InvalidWindow(format!(
                    "offset {} is outside the universe ({} items)",
                    offset, universe_total
                )));
            }
        }
        if self.limit == Some(0) {
            tracing::warn!("limit 0 raised to 1");
        }
        Ok(())
    }
}

/// What one invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// A batch was written.
    Committed {
        batch_start: usize,
        batch_size: usize,
        succeeded: usize,
        failed: usize,
        next_offset: usize,
        cursor_advanced: bool,
    },
    /// A batch was held back; nothing but its status was written.
    Rejected {
        batch_start: usize,
        batch_size: usize,
        succeeded: usize,
        failed: usize,
        reason: RejectReason,
    },
    /// The cycle was merged and published.
    Merged {
        cycle: NaiveDate,
        count: usize,
        part_count: usize,
        missing_parts: usize,
    },
    /// No batch record existed; nothing was published or reset.
    MergeAborted { expected_parts: usize },
    /// Today's cycle was already merged.
    Idle { cycle: NaiveDate },
}

impl InvocationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InvocationOutcome::Committed { .. } => "committed",
            InvocationOutcome::Rejected { .. } => "rejected",
            InvocationOutcome::Merged { .. } => "merged",
            InvocationOutcome::MergeAborted { .. } => "merge-aborted",
            InvocationOutcome::Idle { .. } => "idle",
        }
    }
}

/// Read-only view of the harvester's durable state.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestStatus {
    pub cursor: Option<Cursor>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_batch: Option<BatchStatus>,
}

/// A window selected for fetching.
#[derive(Debug, Clone, Copy)]
struct BatchWindow {
    start: usize,
    size: usize,
    advances_cursor: bool,
    manual: bool,
}

// =============================================================================
// Harvest Service
// =============================================================================

/// Service driving the harvest cycle.
///
/// # Type Parameters
///
/// * `S` - Key-value store implementation (e.g., `KvRestClient`)
/// * `P` - Record provider implementation (e.g., `UpstreamClient`)
///
/// # Example
///
/// ```ignore
/// use sheaf_core::{HarvestService, Universe};
///
/// let service = HarvestService::with_config(kv, upstream, config.harvest);
/// let universe = Universe::from_config(&config.universe)?;
/// let outcome = service.run_invocation(&universe).await?;
/// println!("{}", outcome.label());
/// ```
pub struct HarvestService<S, P>
where
    S: KvStore,
    P: RecordProvider,
{
    store: S,
    provider: P,
    config: HarvestConfig,
    keys: KeyLayout,
    checkpoint: CheckpointManager<S>,
    policy: CommitPolicy,
}

impl<S, P> Clone for HarvestService<S, P>
where
    S: KvStore + Clone,
    P: RecordProvider + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            provider: self.provider.clone(),
            config: self.config.clone(),
            keys: self.keys.clone(),
            checkpoint: self.checkpoint.clone(),
            policy: self.policy,
        }
    }
}

impl<S, P> HarvestService<S, P>
where
    S: KvStore,
    P: RecordProvider,
{
    /// Creates a new harvest service with default configuration.
    pub fn new(store: S, provider: P) -> Self {
        Self::with_config(store, provider, HarvestConfig::default())
    }

    /// Creates a harvest service with custom configuration.
    pub fn with_config(store: S, provider: P, config: HarvestConfig) -> Self {
        let keys = KeyLayout::new(config.key_prefix.clone());
        let checkpoint = CheckpointManager::new(store.clone(), keys.clone());
        let policy = CommitPolicy::new(config.max_failure_ratio);
        Self {
            store,
            provider,
            config,
            keys,
            checkpoint,
            policy,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one invocation with no override, no reporting and the wall clock.
    pub async fn run_invocation(&self, universe: &Universe) -> Result<InvocationOutcome, AppError> {
        self.run_invocation_with_progress(
            universe,
            WindowOverride::default(),
            &SilentReporter,
            Utc::now(),
        )
        .await
    }

    /// Runs one invocation.
    ///
    /// `now` fixes both the cycle date and every timestamp written, which
    /// keeps merges reproducible.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the override is invalid
    /// (before anything is written) or if the key-value store fails. Provider failures are never
    /// errors; they surface as a rejected batch.
    pub async fn run_invocation_with_progress<R: ProgressReporter>(
        &self,
        universe: &Universe,
        window: WindowOverride,
        reporter: &R,
        now: DateTime<Utc>,
    ) -> Result<InvocationOutcome, AppError> {
        self.config.validate()?;
        let batch_size = self.config.batch_size;
        let total = universe.len();
        window.validate(batch_size, total)?;

        let today = now.date_naive();
        let check = self.checkpoint.reset_if_new_cycle(today).await?;
        if let Some(from) = check.reset_from {
            reporter.report(HarvestEvent::CycleReset { from, to: today });
        }
        let cursor = check.cursor;
        reporter.report(HarvestEvent::InvocationStarted {
            cursor: &cursor,
            universe_total: total,
        });

        let idle = self.config.one_cycle_per_day && cursor.is_cycle_complete(today);

        if window.is_manual() {
            let start = window.offset.unwrap_or(cursor.offset);
            if start >= total {
                return Err(AppError::InvalidWindow(format!(
                    "cursor is at the end of the universe ({}); run a merge instead",
                    total
                )));
            }
            let size = window
                .limit
                .unwrap_or(batch_size)
                .clamp(1, batch_size)
                .min(total - start);
            let natural = start == cursor.offset && size == batch_size.min(total - start);
            let planned = BatchWindow {
                start,
                size,
                advances_cursor: natural && !idle,
                manual: true,
            };
            return self
                .run_window(universe, &cursor, planned, reporter, now)
                .await;
        }

        if idle {
            reporter.report(HarvestEvent::Idle { cycle: today });
            return Ok(InvocationOutcome::Idle { cycle: today });
        }

        if cursor.offset >= total {
            return self.merge_cycle(total, Some(&cursor), true, reporter, now).await;
        }

        let planned = BatchWindow {
            start: cursor.offset,
            size: batch_size.min(total - cursor.offset),
            advances_cursor: true,
            manual: false,
        };
        self.run_window(universe, &cursor, planned, reporter, now)
            .await
    }

    /// Fetches one window, classifies it and persists the result.
    async fn run_window<R: ProgressReporter>(
        &self,
        universe: &Universe,
        cursor: &Cursor,
        window: BatchWindow,
        reporter: &R,
        now: DateTime<Utc>,
    ) -> Result<InvocationOutcome, AppError> {
        reporter.report(HarvestEvent::BatchStarted {
            batch_start: window.start,
            batch_size: window.size,
            manual: window.manual,
        });

        let ids = universe.window(window.start, window.size);
        let outcome = run_batch(&self.provider, ids, self.config.concurrency).await;
        let succeeded = outcome.succeeded();
        let failed = outcome.failed();
        let saw_rate_limit = outcome.saw_rate_limit();

        match self.policy.decide(&outcome, saw_rate_limit) {
            CommitDecision::Commit => {
                let record = BatchRecord {
                    batch_start: window.start,
                    batch_size: window.size,
                    generated_at: now,
                    items: outcome.items,
                    failures: outcome.failures,
                };
                set_json(
                    &self.store,
                    &self.keys.batch(window.start),
                    &record,
                    self.config.batch_ttl(),
                )
                .await?;

                self.write_status(BatchStatus {
                    batch_start: window.start,
                    batch_size: window.size,
                    attempted_at: now,
                    succeeded,
                    failed,
                    rate_limited: false,
                    disposition: BatchDisposition::Committed,
                    reason: None,
                })
                .await?;
                self.store
                    .set(&self.keys.last_run(), &now.to_rfc3339(), None)
                    .await?;

                // Cursor goes last: any failed write above leaves it untouched.
                let next_offset = window.start + window.size;
                if window.advances_cursor {
                    self.checkpoint
                        .advance_cursor(cursor, next_offset, universe.len())
                        .await?;
                }

                reporter.report(HarvestEvent::BatchCommitted {
                    batch_start: window.start,
                    succeeded,
                    failed,
                    next_offset,
                    cursor_advanced: window.advances_cursor,
                });
                Ok(InvocationOutcome::Committed {
                    batch_start: window.start,
                    batch_size: window.size,
                    succeeded,
                    failed,
                    next_offset,
                    cursor_advanced: window.advances_cursor,
                })
            }
            CommitDecision::Reject(reason) => {
                self.write_status(BatchStatus {
                    batch_start: window.start,
                    batch_size: window.size,
                    attempted_at: now,
                    succeeded,
                    failed,
                    rate_limited: saw_rate_limit,
                    disposition: BatchDisposition::Rejected,
                    reason: Some(reason.to_string()),
                })
                .await?;

                reporter.report(HarvestEvent::BatchRejected {
                    batch_start: window.start,
                    succeeded,
                    failed,
                    reason: &reason,
                });
                Ok(InvocationOutcome::Rejected {
                    batch_start: window.start,
                    batch_size: window.size,
                    succeeded,
                    failed,
                    reason,
                })
            }
        }
    }

    async fn write_status(&self, status: BatchStatus) -> Result<(), AppError> {
        let ttl = Some(self.config.status_ttl());
        set_json(&self.store, &self.keys.status(status.batch_start), &status, ttl).await?;
        set_json(&self.store, &self.keys.last_status(), &status, ttl).await
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Forces a merge of whatever batch records exist.
    ///
    /// Publishes the snapshot and records the cycle. The cursor is only
    /// marked complete when it already sits at the universe end; a forced
    /// merge in the middle of a cycle leaves progress untouched.
    pub async fn merge_with_progress<R: ProgressReporter>(
        &self,
        universe: &Universe,
        reporter: &R,
        now: DateTime<Utc>,
    ) -> Result<InvocationOutcome, AppError> {
        self.config.validate()?;
        let total = universe.len();
        let cursor = self.checkpoint.load_cursor().await?;
        let at_end = cursor
            .as_ref()
            .is_some_and(|c| c.cycle_date == now.date_naive() && c.offset >= total);
        self.merge_cycle(total, cursor.as_ref(), at_end, reporter, now)
            .await
    }

    async fn merge_cycle<R: ProgressReporter>(
        &self,
        universe_total: usize,
        cursor: Option<&Cursor>,
        complete_cycle: bool,
        reporter: &R,
        now: DateTime<Utc>,
    ) -> Result<InvocationOutcome, AppError> {
        let today = now.date_naive();
        let expected_parts = expected_slots(universe_total, self.config.batch_size).len();
        reporter.report(HarvestEvent::MergeStarted {
            universe_total,
            expected_parts,
        });

        let collected = collect_batches(
            &self.store,
            &self.keys,
            universe_total,
            self.config.batch_size,
        )
        .await?;

        if collected.batches.is_empty() {
            reporter.report(HarvestEvent::MergeAborted { expected_parts });
            return Ok(InvocationOutcome::MergeAborted { expected_parts });
        }

        let snapshot = build_snapshot(&collected, universe_total, now);
        set_json(&self.store, &self.keys.latest(), &snapshot, None).await?;

        if complete_cycle {
            self.checkpoint.complete_cycle(cursor, today).await?;
        }
        self.store
            .add_to_set(&self.keys.cycles(), &today.to_string())
            .await?;

        reporter.report(HarvestEvent::MergePublished {
            count: snapshot.count,
            part_count: snapshot.part_count,
            missing_parts: snapshot.missing_parts,
        });
        Ok(InvocationOutcome::Merged {
            cycle: today,
            count: snapshot.count,
            part_count: snapshot.part_count,
            missing_parts: snapshot.missing_parts,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads the cursor, the last-run timestamp and the latest batch status.
    pub async fn status(&self) -> Result<HarvestStatus, AppError> {
        let cursor = self.checkpoint.load_cursor().await?;
        let last_run = self
            .store
            .get(&self.keys.last_run())
            .await?
            .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => Some(at.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Unreadable last-run timestamp");
                    None
                }
            });
        let last_batch = get_json(&self.store, &self.keys.last_status()).await?;

        Ok(HarvestStatus {
            cursor,
            last_run,
            last_batch,
        })
    }

    /// Reads the published snapshot, if any.
    pub async fn snapshot(&self) -> Result<Option<MergedSnapshot>, AppError> {
        get_json(&self.store, &self.keys.latest()).await
    }
}

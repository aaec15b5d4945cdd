//! Merge step: fold every committed batch of the cycle into one snapshot.
//!
//! Reads the expected slots `0, B, 2B, …` below the universe end. Missing
//! or unreadable slots are counted and skipped. Records are deduplicated by
//! identifier, first writer wins, scanning slots in ascending `batch_start`
//! and items in stored order. The output depends only on the slots read and
//! the `now` passed in.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::AppError;
use crate::models::{BatchRecord, MergedSnapshot};
use crate::storage::KeyLayout;
use crate::traits::KvStore;

/// Batch records found for a cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedBatches {
    /// Present batches, ascending `batch_start`.
    pub batches: Vec<BatchRecord>,
    /// Expected slots that were absent or unreadable.
    pub missing: Vec<usize>,
}

/// Slot offsets a cycle over `universe_total` items with `batch_size` produces.
pub fn expected_slots(universe_total: usize, batch_size: usize) -> Vec<usize> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..universe_total).step_by(batch_size).collect()
}

/// Reads every expected batch slot.
pub async fn collect_batches<S: KvStore>(
    store: &S,
    keys: &KeyLayout,
    universe_total: usize,
    batch_size: usize,
) -> Result<CollectedBatches, AppError> {
    let mut collected = CollectedBatches::default();

    for start in expected_slots(universe_total, batch_size) {
        let key = keys.batch(start);
        let Some(raw) = store.get(&key).await? else {
            tracing::warn!(batch_start = start, "Batch slot missing at merge");
            collected.missing.push(start);
            continue;
        };
        match serde_json::from_str::<BatchRecord>(&raw) {
            Ok(batch) => collected.batches.push(batch),
            Err(e) => {
                tracing::warn!(batch_start = start, error = %e, "Batch slot unreadable at merge");
                collected.missing.push(start);
            }
        }
    }

    collected.batches.sort_by_key(|b| b.batch_start);
    Ok(collected)
}

/// Builds the unified snapshot from collected batches.
pub fn build_snapshot(
    collected: &CollectedBatches,
    universe_total: usize,
    now: DateTime<Utc>,
) -> MergedSnapshot {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut items = Vec::new();

    for batch in &collected.batches {
        for record in &batch.items {
            if seen.insert(record.id.as_str()) {
                items.push(record.clone());
            }
        }
    }

    MergedSnapshot {
        generated_at: now,
        universe_total,
        part_count: collected.batches.len(),
        missing_parts: collected.missing.len(),
        count: items.len(),
        items,
    }
}

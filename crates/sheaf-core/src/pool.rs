//! Bounded worker pool for one batch.
//!
//! `concurrency` workers share an atomic index and keep claiming the next
//! unprocessed identifier until the slice is exhausted. Workers run as
//! futures joined on the calling task, so nothing is spawned and the
//! provider is only borrowed. Each fetch is isolated: a failure or a panic
//! is recorded for that identifier and the worker moves on.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::join_all;

use crate::models::{FailureKind, FetchFailure, FetchResult, Record};
use crate::traits::RecordProvider;

/// Items and failures of one batch, each in universe order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub items: Vec<Record>,
    pub failures: Vec<FetchFailure>,
}

impl BatchOutcome {
    /// Splits per-identifier results (already in universe order).
    pub fn from_results(results: impl IntoIterator<Item = FetchResult>) -> Self {
        let mut outcome = Self::default();
        for result in results {
            match result {
                Ok(record) => outcome.items.push(record),
                Err(failure) => outcome.failures.push(failure),
            }
        }
        outcome
    }

    pub fn succeeded(&self) -> usize {
        self.items.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn attempted(&self) -> usize {
        self.items.len() + self.failures.len()
    }

    /// Number of failures classified as rate-limited.
    pub fn rate_limited(&self) -> usize {
        self.failures.iter().filter(|f| f.is_rate_limited()).count()
    }

    pub fn saw_rate_limit(&self) -> bool {
        self.rate_limited() > 0
    }

    /// Failed / attempted, or `0.0` for an empty batch.
    pub fn failure_ratio(&self) -> f64 {
        match self.attempted() {
            0 => 0.0,
            n => self.failed() as f64 / n as f64,
        }
    }
}

/// Fetches every identifier in `ids` with at most `concurrency` requests in
/// flight.
///
/// Concurrency is clamped to `[1, ids.len()]`. Each identifier is fetched
/// exactly once.
pub async fn run_batch<P: RecordProvider>(
    provider: &P,
    ids: &[String],
    concurrency: usize,
) -> BatchOutcome {
    if ids.is_empty() {
        return BatchOutcome::default();
    }

    let workers = concurrency.clamp(1, ids.len());
    let next = AtomicUsize::new(0);
    let next = &next;

    let worker = move |worker_id: usize| async move {
        let mut done: Vec<(usize, FetchResult)> = Vec::new();
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(id) = ids.get(index) else {
                break;
            };
            let result = match AssertUnwindSafe(provider.fetch_record(id))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(worker_id, id = %id, %message, "Fetch panicked");
                    Err(FetchFailure::new(id, FailureKind::Exception)
                        .with_message(format!("panic: {message}")))
                }
            };
            if let Err(failure) = &result {
                tracing::debug!(
                    worker_id,
                    id = %failure.id,
                    kind = %failure.kind,
                    "Fetch failed"
                );
            }
            done.push((index, result));
        }
        done
    };

    let finished = join_all((0..workers).map(worker)).await;

    let mut slots: Vec<Option<FetchResult>> = (0..ids.len()).map(|_| None).collect();
    for (index, result) in finished.into_iter().flatten() {
        slots[index] = Some(result);
    }

    BatchOutcome::from_results(slots.into_iter().flatten())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

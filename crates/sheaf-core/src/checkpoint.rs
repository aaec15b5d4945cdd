//! Checkpoint manager: the only code that reads or writes the cursor.
//!
//! Every cursor write goes through [`CheckpointManager::write`], which bumps
//! `version`. Concurrent invocations are not fenced: two overlapping runs
//! can both read offset `n`, both fetch the same window and both advance to
//! `n + B`. The outcome is duplicated work, never lost items, because batch
//! records are keyed by `batch_start`. A compare-and-swap on `version` would
//! slot in here.

use chrono::NaiveDate;

use crate::AppError;
use crate::models::Cursor;
use crate::storage::KeyLayout;
use crate::traits::KvStore;

/// Result of [`CheckpointManager::reset_if_new_cycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCheck {
    /// The cursor to slice from.
    pub cursor: Cursor,
    /// The previous cycle date when a reset happened.
    pub reset_from: Option<NaiveDate>,
    /// True when no usable cursor existed and a fresh one was written.
    pub initialized: bool,
}

/// Owns the cursor record in the key-value store.
#[derive(Debug, Clone)]
pub struct CheckpointManager<S: KvStore> {
    store: S,
    keys: KeyLayout,
}

impl<S: KvStore> CheckpointManager<S> {
    pub fn new(store: S, keys: KeyLayout) -> Self {
        Self { store, keys }
    }

    /// Reads the cursor.
    ///
    /// A missing cursor is `Ok(None)`. So is an unreadable one: it is logged
    /// and treated as absent, which restarts the cycle from offset 0. Store
    /// errors propagate.
    pub async fn load_cursor(&self) -> Result<Option<Cursor>, AppError> {
        let key = self.keys.cursor();
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Cursor>(&raw) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Unreadable cursor, restarting cycle");
                Ok(None)
            }
        }
    }

    /// Guarantees the cursor belongs to `today` before any batch work.
    ///
    /// Initialises a missing cursor to `{0, today}` and resets a cursor from
    /// an earlier day. The previous `completed_cycle` marker is carried over
    /// so status output still shows the last merged day.
    pub async fn reset_if_new_cycle(&self, today: NaiveDate) -> Result<CycleCheck, AppError> {
        match self.load_cursor().await? {
            None => {
                let cursor = self.write(Cursor::start_of(today)).await?;
                tracing::info!(cycle = %today, "Initialised cursor");
                Ok(CycleCheck {
                    cursor,
                    reset_from: None,
                    initialized: true,
                })
            }
            Some(cursor) if cursor.cycle_date != today => {
                let previous = cursor.cycle_date;
                let reset = Cursor {
                    offset: 0,
                    cycle_date: today,
                    version: cursor.version,
                    completed_cycle: cursor.completed_cycle,
                };
                let cursor = self.write(reset).await?;
                tracing::info!(from = %previous, to = %today, "New cycle, cursor reset");
                Ok(CycleCheck {
                    cursor,
                    reset_from: Some(previous),
                    initialized: false,
                })
            }
            Some(cursor) => Ok(CycleCheck {
                cursor,
                reset_from: None,
                initialized: false,
            }),
        }
    }

    /// Moves the cursor forward after a committed batch.
    ///
    /// `new_offset` must lie in `(current.offset, universe_total]`.
    pub async fn advance_cursor(
        &self,
        current: &Cursor,
        new_offset: usize,
        universe_total: usize,
    ) -> Result<Cursor, AppError> {
        if new_offset > universe_total {
            return Err(AppError::InvalidWindow(format!(
                "cursor offset {} exceeds universe size {}",
                new_offset, universe_total
            )));
        }
        if new_offset <= current.offset {
            return Err(AppError::InvalidWindow(format!(
                "cursor must move forward: {} -> {}",
                current.offset, new_offset
            )));
        }

        let next = Cursor {
            offset: new_offset,
            ..current.clone()
        };
        self.write(next).await
    }

    /// Marks `today`'s cycle as merged and rewinds to offset 0.
    pub async fn complete_cycle(
        &self,
        current: Option<&Cursor>,
        today: NaiveDate,
    ) -> Result<Cursor, AppError> {
        let next = Cursor {
            offset: 0,
            cycle_date: today,
            version: current.map_or(0, |c| c.version),
            completed_cycle: Some(today),
        };
        self.write(next).await
    }

    /// Persists `cursor` with its version bumped and returns what was written.
    async fn write(&self, mut cursor: Cursor) -> Result<Cursor, AppError> {
        cursor.version = cursor.version.wrapping_add(1);
        let raw = serde_json::to_string(&cursor)?;
        self.store.set(&self.keys.cursor(), &raw, None).await?;
        tracing::debug!(
            offset = cursor.offset,
            cycle = %cursor.cycle_date,
            version = cursor.version,
            "Cursor written"
        );
        Ok(cursor)
    }
}

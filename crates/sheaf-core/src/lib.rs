//! Sheaf Core - checkpointed batch harvesting.
//!
//! This crate holds everything that decides *what* the harvester does,
//! decoupled from HTTP and process concerns:
//!
//! - **Domain models**: [`Record`], [`Cursor`], [`BatchRecord`], [`MergedSnapshot`]
//! - **Services**: [`HarvestService`] runs one invocation (one batch or one merge)
//! - **Building blocks**: [`run_batch`] worker pool, [`CheckpointManager`],
//!   [`CommitPolicy`], the merge step in [`merge`]
//! - **Traits**: [`KvStore`] and [`RecordProvider`] for dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging
//!
//! # Architecture
//!
//! Every invocation starts from nothing but the key-value store. The cursor
//! says where the cycle stands; the universe says what the items are; the
//! provider answers per-item lookups. Concrete HTTP implementations of the
//! two traits live in `sheaf-client`.
//!
//! # Example
//!
//! ```ignore
//! use sheaf_core::{HarvestService, TracingReporter, Universe, WindowOverride};
//!
//! let service = HarvestService::with_config(kv, upstream, config.harvest);
//! let universe = Universe::from_config(&config.universe)?;
//! let outcome = service
//!     .run_invocation_with_progress(
//!         &universe,
//!         WindowOverride::default(),
//!         &TracingReporter,
//!         chrono::Utc::now(),
//!     )
//!     .await?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod harvest;
pub mod memory;
pub mod merge;
pub mod models;
pub mod policy;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod storage;
pub mod traits;
pub mod universe;

// Configuration
pub use config::{
    HarvestConfig, HttpConfig, ProviderConfig, SheafConfig, UniverseConfig, default_config_path,
    load_sheaf_config,
};

// Error handling
pub use error::AppError;

// Domain models
pub use models::{
    BatchDisposition, BatchRecord, BatchStatus, Cursor, FailureKind, FetchFailure, FetchResult,
    MergedSnapshot, Record,
};

// Building blocks
pub use checkpoint::{CheckpointManager, CycleCheck};
pub use memory::MemoryStore;
pub use policy::{CommitDecision, CommitPolicy, RejectReason};
pub use pool::{BatchOutcome, run_batch};
pub use retry::{RetryPolicy, StatusClass, parse_retry_after};
pub use storage::KeyLayout;
pub use universe::Universe;

// Progress reporting
pub use progress::{HarvestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{KvStore, RecordProvider};

// Services
pub use harvest::{HarvestService, HarvestStatus, InvocationOutcome, WindowOverride};

//! Runtime selection of the key-value store backend.
//!
//! [`KvStore`] returns `impl Future` and is not object-safe, so backends are
//! chosen through an enum rather than `dyn KvStore`.
//!
//! ```no_run
//! use sheaf_client::store::KvStoreEnum;
//! use sheaf_core::{HttpConfig, RetryPolicy};
//!
//! # fn example() -> Result<(), sheaf_core::AppError> {
//! let store = KvStoreEnum::rest(
//!     "https://kv.example.com",
//!     "token",
//!     &HttpConfig::default(),
//!     RetryPolicy::default(),
//! )?;
//! println!("Using the {} store", store.name());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use sheaf_core::config::HttpConfig;
use sheaf_core::error::AppError;
use sheaf_core::memory::MemoryStore;
use sheaf_core::retry::RetryPolicy;
use sheaf_core::traits::KvStore;

use crate::KvRestClient;

/// Key-value store chosen at startup.
#[derive(Clone, Debug)]
pub enum KvStoreEnum {
    /// Remote REST store; state survives the process.
    Rest(KvRestClient),
    /// In-process store for local dry runs.
    Memory(MemoryStore),
}

impl KvStoreEnum {
    /// Creates a REST-backed store.
    pub fn rest(
        base_url: &str,
        token: &str,
        http: &HttpConfig,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        Ok(Self::Rest(KvRestClient::new(base_url, token, http, retry)?))
    }

    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rest(_) => "rest",
            Self::Memory(_) => "memory",
        }
    }
}

impl KvStore for KvStoreEnum {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match self {
            Self::Rest(c) => c.get(key).await,
            Self::Memory(m) => m.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        match self {
            Self::Rest(c) => c.set(key, value, ttl).await,
            Self::Memory(m) => m.set(key, value, ttl).await,
        }
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, AppError> {
        match self {
            Self::Rest(c) => c.add_to_set(key, member).await,
            Self::Memory(m) => m.add_to_set(key, member).await,
        }
    }
}

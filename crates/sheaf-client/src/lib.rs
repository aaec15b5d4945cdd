//! Sheaf Client - HTTP clients for external services
//!
//! This crate provides HTTP clients for:
//!
//! - [`kv`] - the key-value REST store holding cursor, batches and snapshots
//! - [`upstream`] - the upstream record provider
//! - [`store`] - runtime choice between the REST store and the in-memory one
//!
//! # Overview
//!
//! Both clients share the retry policy from `sheaf-core` and implement the
//! core traits ([`KvStore`](sheaf_core::traits::KvStore) and
//! [`RecordProvider`](sheaf_core::traits::RecordProvider)), so the harvest
//! service can be wired to them directly.

pub mod kv;
pub mod store;
pub mod upstream;

// Re-export main client types
pub use kv::KvRestClient;
pub use store::KvStoreEnum;
pub use upstream::{UpstreamClient, candidate_symbols, map_payload};

//! Sheaf Server - HTTP trigger and reader for the harvester
//!
//! This crate exposes the harvest service over HTTP:
//!
//! - **Invoke**: run one invocation (`POST /api/v1/invoke`), typically from
//!   an external scheduler
//! - **Merge**: force a merge for manual recovery
//! - **Status**: cursor, last run and last batch
//! - **Snapshot**: the published merged snapshot
//!
//! # API Documentation
//!
//! When running the server, interactive API documentation is available
//! at `/swagger-ui`.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;

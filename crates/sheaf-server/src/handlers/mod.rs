//! HTTP request handlers for API endpoints.

pub mod harvest;
pub mod health;
pub mod snapshot;

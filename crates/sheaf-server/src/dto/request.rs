//! Request DTOs for API endpoints.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use sheaf_core::WindowOverride;

/// Optional manual window for `POST /api/v1/invoke`.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct InvokeParams {
    /// Slot start; must be a multiple of the batch size
    #[param(example = 100)]
    pub offset: Option<usize>,

    /// Items to fetch, clamped to [1, batch_size]
    #[param(example = 10)]
    pub limit: Option<usize>,
}

impl InvokeParams {
    pub fn window(&self) -> WindowOverride {
        WindowOverride {
            offset: self.offset,
            limit: self.limit,
        }
    }
}

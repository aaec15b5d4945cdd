//! Published snapshot readers.

use axum::{Json, extract::State};

use sheaf_core::MergedSnapshot;

use crate::dto::SnapshotSummaryResponse;
use crate::error::ApiError;
use crate::state::AppState;

async fn load(state: &AppState) -> Result<MergedSnapshot, ApiError> {
    state
        .harvest_service
        .snapshot()
        .await?
        .ok_or_else(|| ApiError::NotFound("No snapshot has been published yet".to_string()))
}

/// The published snapshot.
///
/// Body: `{ generatedAt, universeTotal, partCount, missingParts, count, items }`.
#[utoipa::path(
    get,
    path = "/api/v1/snapshot",
    responses(
        (status = 200, description = "Latest merged snapshot"),
        (status = 404, description = "Nothing published yet"),
    ),
    tag = "snapshot"
)]
pub async fn get_snapshot(State(state): State<AppState>) -> Result<Json<MergedSnapshot>, ApiError> {
    Ok(Json(load(&state).await?))
}

/// Counts of the published snapshot.
#[utoipa::path(
    get,
    path = "/api/v1/snapshot/summary",
    responses(
        (status = 200, description = "Snapshot counts", body = SnapshotSummaryResponse),
        (status = 404, description = "Nothing published yet"),
    ),
    tag = "snapshot"
)]
pub async fn get_snapshot_summary(
    State(state): State<AppState>,
) -> Result<Json<SnapshotSummaryResponse>, ApiError> {
    let snapshot = load(&state).await?;
    Ok(Json(SnapshotSummaryResponse::from(&snapshot)))
}

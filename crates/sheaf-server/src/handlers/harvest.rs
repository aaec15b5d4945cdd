//! Invocation endpoints and the status reader.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use sheaf_core::{TracingReporter, Universe};

use crate::dto::{InvocationResponse, InvokeParams, StatusResponse};
use crate::error::ApiError;
use crate::state::AppState;

fn ensure_running(state: &AppState) -> Result<(), ApiError> {
    if state.shutdown_token.is_cancelled() {
        return Err(ApiError::ServiceUnavailable(
            "Server is shutting down".to_string(),
        ));
    }
    Ok(())
}

/// Run one invocation.
///
/// Processes the next batch, or merges once every slot of the cycle is
/// done. `offset`/`limit` select a manual window for recovery. A rejected
/// batch is a normal outcome and still answers 200.
#[utoipa::path(
    post,
    path = "/api/v1/invoke",
    params(InvokeParams),
    responses(
        (status = 200, description = "Invocation finished", body = InvocationResponse),
        (status = 400, description = "Invalid manual window"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Invocation endpoints disabled"),
        (status = 503, description = "Store unavailable or server shutting down"),
    ),
    security(("bearer_auth" = [])),
    tag = "harvest"
)]
pub async fn invoke(
    State(state): State<AppState>,
    Query(params): Query<InvokeParams>,
) -> Result<Json<InvocationResponse>, ApiError> {
    ensure_running(&state)?;
    let universe = Universe::from_config(&state.universe)?;
    let invocation_id = Uuid::new_v4();

    let _guard = state.invocation_lock.lock().await;
    let outcome = state
        .harvest_service
        .run_invocation_with_progress(&universe, params.window(), &TracingReporter, Utc::now())
        .instrument(tracing::info_span!("invocation", id = %invocation_id))
        .await?;

    Ok(Json(InvocationResponse::new(invocation_id, outcome)))
}

/// Force a merge of the batch records that exist.
#[utoipa::path(
    post,
    path = "/api/v1/merge",
    responses(
        (status = 200, description = "Merge finished or aborted", body = InvocationResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Invocation endpoints disabled"),
        (status = 503, description = "Store unavailable or server shutting down"),
    ),
    security(("bearer_auth" = [])),
    tag = "harvest"
)]
pub async fn merge(State(state): State<AppState>) -> Result<Json<InvocationResponse>, ApiError> {
    ensure_running(&state)?;
    let universe = Universe::from_config(&state.universe)?;
    let invocation_id = Uuid::new_v4();

    let _guard = state.invocation_lock.lock().await;
    let outcome = state
        .harvest_service
        .merge_with_progress(&universe, &TracingReporter, Utc::now())
        .instrument(tracing::info_span!("merge", id = %invocation_id))
        .await?;

    Ok(Json(InvocationResponse::new(invocation_id, outcome)))
}

/// Cursor, last run and last batch status.
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Harvest status", body = StatusResponse),
        (status = 503, description = "Store unavailable"),
    ),
    tag = "harvest"
)]
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.harvest_service.status().await?;
    Ok(Json(status.into()))
}

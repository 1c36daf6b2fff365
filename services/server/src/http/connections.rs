use super::require_user;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

/// GET /api/v1/projects/:project_id/connections
///
/// Operator snapshot of the hub: total live sessions, sessions scoped to
/// this project, and the user ids behind them.
pub async fn get_connections(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(resp) = require_user(&state, &headers).await {
        return resp;
    }
    let snapshot = state.hub.project_connections(project_id);
    (StatusCode::OK, Json(snapshot)).into_response()
}

use super::response::{bad_request, internal_error, not_found};
use super::{require_member, require_user};
use crate::broadcast;
use crate::repo::sprints as repo;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tl_protocol::event_types;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateSprintBody {
    pub name: String,
    #[serde(default, rename = "startDate")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PatchSprintBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "startDate")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
}

/// GET /api/v1/projects/:project_id/sprints
pub async fn list_sprints(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    match repo::list(&state.pool, project_id).await {
        Ok(rows) => (
            StatusCode::OK,
            Json(serde_json::json!({ "sprints": rows })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/projects/:project_id/sprints
pub async fn create_sprint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(body): Json<CreateSprintBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    if body.name.trim().is_empty() {
        return bad_request("name is required");
    }
    match repo::create(
        &state.pool,
        project_id,
        body.name.trim(),
        body.start_date,
        body.end_date,
    )
    .await
    {
        Ok(row) => {
            broadcast::publish(&state.hub, project_id, event_types::SPRINT_CREATED, &row);
            (StatusCode::CREATED, Json(row)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// PATCH /api/v1/sprints/:sprint_id
pub async fn patch_sprint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sprint_id): Path<Uuid>,
    Json(body): Json<PatchSprintBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let sprint = match repo::fetch(&state.pool, sprint_id).await {
        Ok(Some(sprint)) => sprint,
        Ok(None) => return not_found("sprint not found"),
        Err(e) => return internal_error(e),
    };
    if let Err(resp) = require_member(&state, claims.user_id, sprint.project_id).await {
        return resp;
    }
    match repo::update(
        &state.pool,
        sprint_id,
        body.name.as_deref(),
        body.start_date,
        body.end_date,
    )
    .await
    {
        Ok(Some(row)) => {
            broadcast::publish(&state.hub, row.project_id, event_types::SPRINT_UPDATED, &row);
            (StatusCode::OK, Json(row)).into_response()
        }
        Ok(None) => not_found("sprint not found"),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/sprints/:sprint_id
pub async fn delete_sprint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sprint_id): Path<Uuid>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let sprint = match repo::fetch(&state.pool, sprint_id).await {
        Ok(Some(sprint)) => sprint,
        Ok(None) => return not_found("sprint not found"),
        Err(e) => return internal_error(e),
    };
    if let Err(resp) = require_member(&state, claims.user_id, sprint.project_id).await {
        return resp;
    }
    match repo::delete(&state.pool, sprint_id).await {
        Ok(Some(row)) => {
            broadcast::publish(&state.hub, row.project_id, event_types::SPRINT_DELETED, &row);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => not_found("sprint not found"),
        Err(e) => internal_error(e),
    }
}

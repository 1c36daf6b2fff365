use super::response::{bad_request, internal_error, not_found};
use super::{require_member, require_user};
use crate::repo::projects as repo;
use crate::state::AppState;
use crate::broadcast;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tl_protocol::event_types;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchProjectBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// GET /api/v1/projects — the caller's projects.
pub async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    match repo::list_for_user(&state.pool, claims.user_id).await {
        Ok(rows) => (
            StatusCode::OK,
            Json(serde_json::json!({ "projects": rows })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/projects — no write-path event: project creation reaches
/// clients through the trigger path's broadcast-to-all invalidation.
pub async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if body.name.trim().is_empty() {
        return bad_request("name is required");
    }
    match repo::create(
        &state.pool,
        body.name.trim(),
        body.description.as_deref(),
        claims.user_id,
    )
    .await
    {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/projects/:project_id
pub async fn get_project(
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
    match repo::fetch(&state.pool, project_id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row)).into_response(),
        Ok(None) => not_found("project not found"),
        Err(e) => internal_error(e),
    }
}

/// PATCH /api/v1/projects/:project_id
pub async fn patch_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(body): Json<PatchProjectBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return bad_request("name must not be empty");
    }
    match repo::update(
        &state.pool,
        project_id,
        body.name.as_deref(),
        body.description.as_deref(),
    )
    .await
    {
        Ok(Some(row)) => {
            broadcast::publish(&state.hub, project_id, event_types::PROJECT_UPDATED, &row);
            (StatusCode::OK, Json(row)).into_response()
        }
        Ok(None) => not_found("project not found"),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/projects/:project_id
pub async fn delete_project(
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
    match repo::delete(&state.pool, project_id).await {
        Ok(Some(row)) => {
            broadcast::publish(&state.hub, project_id, event_types::PROJECT_DELETED, &row);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => not_found("project not found"),
        Err(e) => internal_error(e),
    }
}

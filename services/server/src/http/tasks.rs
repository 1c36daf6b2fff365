use super::response::{bad_request, internal_error, not_found};
use super::{require_member, require_user};
use crate::broadcast;
use crate::repo::tasks as repo;
use crate::state::AppState;
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
pub struct CreateTaskBody {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "sprintId")]
    pub sprint_id: Option<Uuid>,
    #[serde(default, rename = "assigneeId")]
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PatchTaskBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "sprintId")]
    pub sprint_id: Option<Uuid>,
    #[serde(default, rename = "assigneeId")]
    pub assignee_id: Option<Uuid>,
}

/// GET /api/v1/projects/:project_id/tasks
pub async fn list_tasks(
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
        Ok(rows) => (StatusCode::OK, Json(serde_json::json!({ "tasks": rows }))).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/projects/:project_id/tasks
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(body): Json<CreateTaskBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    if body.title.trim().is_empty() {
        return bad_request("title is required");
    }
    match repo::create(
        &state.pool,
        project_id,
        body.sprint_id,
        body.title.trim(),
        body.description.as_deref(),
        body.status.as_deref(),
        body.assignee_id,
    )
    .await
    {
        Ok(row) => {
            broadcast::publish(&state.hub, project_id, event_types::TASK_CREATED, &row);
            (StatusCode::CREATED, Json(row)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// PATCH /api/v1/tasks/:task_id
pub async fn patch_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Json(body): Json<PatchTaskBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let task = match repo::fetch(&state.pool, task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => return not_found("task not found"),
        Err(e) => return internal_error(e),
    };
    if let Err(resp) = require_member(&state, claims.user_id, task.project_id).await {
        return resp;
    }
    match repo::update(
        &state.pool,
        task_id,
        body.sprint_id,
        body.title.as_deref(),
        body.description.as_deref(),
        body.status.as_deref(),
        body.assignee_id,
    )
    .await
    {
        Ok(Some(row)) => {
            broadcast::publish(&state.hub, row.project_id, event_types::TASK_UPDATED, &row);
            (StatusCode::OK, Json(row)).into_response()
        }
        Ok(None) => not_found("task not found"),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/tasks/:task_id
pub async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    let task = match repo::fetch(&state.pool, task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => return not_found("task not found"),
        Err(e) => return internal_error(e),
    };
    if let Err(resp) = require_member(&state, claims.user_id, task.project_id).await {
        return resp;
    }
    match repo::delete(&state.pool, task_id).await {
        Ok(Some(row)) => {
            broadcast::publish(&state.hub, row.project_id, event_types::TASK_DELETED, &row);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => not_found("task not found"),
        Err(e) => internal_error(e),
    }
}

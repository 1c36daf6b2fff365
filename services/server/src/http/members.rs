use super::response::{conflict, internal_error, not_found};
use super::{require_member, require_user};
use crate::broadcast;
use crate::repo::members as repo;
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
pub struct AddMemberBody {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

/// GET /api/v1/projects/:project_id/members
pub async fn list_members(
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
            Json(serde_json::json!({ "members": rows })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/projects/:project_id/members
pub async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(body): Json<AddMemberBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    match repo::add(&state.pool, project_id, body.user_id).await {
        Ok(Some(row)) => {
            broadcast::publish_with_user(
                &state.hub,
                project_id,
                body.user_id,
                event_types::MEMBER_ADDED,
                &row,
            );
            (StatusCode::CREATED, Json(row)).into_response()
        }
        Ok(None) => conflict("already a member"),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/projects/:project_id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    match repo::remove(&state.pool, project_id, user_id).await {
        Ok(Some(row)) => {
            broadcast::publish_with_user(
                &state.hub,
                project_id,
                user_id,
                event_types::MEMBER_REMOVED,
                &row,
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => not_found("membership not found"),
        Err(e) => internal_error(e),
    }
}

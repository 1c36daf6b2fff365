use super::response::{bad_request, internal_error};
use super::{require_member, require_user};
use crate::broadcast;
use crate::repo::messages as repo;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tl_protocol::event_types;
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    pub content: String,
}

/// GET /api/v1/projects/:project_id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match repo::list(&state.pool, project_id, limit).await {
        Ok(rows) => (
            StatusCode::OK,
            Json(serde_json::json!({ "messages": rows })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/projects/:project_id/messages
pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(body): Json<PostMessageBody>,
) -> impl IntoResponse {
    let claims = match require_user(&state, &headers).await {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_member(&state, claims.user_id, project_id).await {
        return resp;
    }
    if body.content.trim().is_empty() {
        return bad_request("content is required");
    }
    match repo::create(&state.pool, project_id, claims.user_id, body.content.trim()).await {
        Ok(row) => {
            broadcast::publish(&state.hub, project_id, event_types::MESSAGE_CREATED, &row);
            (StatusCode::CREATED, Json(row)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

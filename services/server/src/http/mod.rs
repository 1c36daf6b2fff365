pub mod connections;
pub mod members;
pub mod messages;
pub mod projects;
pub mod response;
pub mod sprints;
pub mod tasks;

use crate::auth::{self, TokenClaims};
use crate::repo::members as member_repo;
use crate::state::AppState;
use axum::http::HeaderMap;
use self::response::{forbidden, internal_error, unauthorized, HttpResponse};
use uuid::Uuid;

/// Bearer authentication for every API handler.
pub(crate) async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<TokenClaims, HttpResponse> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(auth::extract_bearer);
    let Some(token) = token else {
        return Err(unauthorized("missing bearer token"));
    };
    auth::validate_token(&state.pool, token)
        .await
        .ok_or_else(|| unauthorized("invalid or expired token"))
}

/// Membership guard for project-scoped handlers.
pub(crate) async fn require_member(
    state: &AppState,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<(), HttpResponse> {
    match member_repo::is_member(&state.pool, user_id, project_id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(forbidden("not a member of this project")),
        Err(e) => Err(internal_error(e)),
    }
}

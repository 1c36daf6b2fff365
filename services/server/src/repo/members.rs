use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MemberRow {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// Membership gate for session scoping and handler authorization.
pub async fn is_member(
    pool: &PgPool,
    user_id: Uuid,
    project_id: Uuid,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(
             SELECT 1 FROM project_members WHERE project_id = $1 AND user_id = $2
         )",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn list(pool: &PgPool, project_id: Uuid) -> Result<Vec<MemberRow>, sqlx::Error> {
    sqlx::query_as::<_, MemberRow>(
        "SELECT project_id, user_id, joined_at
         FROM project_members
         WHERE project_id = $1
         ORDER BY joined_at ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

/// Returns `None` when the user is already a member.
pub async fn add(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<Option<MemberRow>, sqlx::Error> {
    sqlx::query_as::<_, MemberRow>(
        "INSERT INTO project_members (project_id, user_id)
         VALUES ($1, $2)
         ON CONFLICT (project_id, user_id) DO NOTHING
         RETURNING project_id, user_id, joined_at",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Returns `None` when no such membership existed.
pub async fn remove(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<Option<MemberRow>, sqlx::Error> {
    sqlx::query_as::<_, MemberRow>(
        "DELETE FROM project_members
         WHERE project_id = $1 AND user_id = $2
         RETURNING project_id, user_id, joined_at",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Most recent messages first-in order; capped so a long-lived thread
/// cannot blow up the response.
pub async fn list(
    pool: &PgPool,
    project_id: Uuid,
    limit: i64,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>(
        "SELECT id, project_id, user_id, content, created_at FROM (
             SELECT id, project_id, user_id, content, created_at
             FROM messages WHERE project_id = $1
             ORDER BY created_at DESC
             LIMIT $2
         ) recent
         ORDER BY created_at ASC",
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn create(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    content: &str,
) -> Result<MessageRow, sqlx::Error> {
    sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (project_id, user_id, content)
         VALUES ($1, $2, $3)
         RETURNING id, project_id, user_id, content, created_at",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(content)
    .fetch_one(pool)
    .await
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<ProjectRow>, sqlx::Error> {
    sqlx::query_as::<_, ProjectRow>(
        "SELECT p.id, p.name, p.description, p.owner_id, p.created_at, p.updated_at
         FROM projects p
         JOIN project_members m ON m.project_id = p.id
         WHERE m.user_id = $1
         ORDER BY p.created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn fetch(pool: &PgPool, project_id: Uuid) -> Result<Option<ProjectRow>, sqlx::Error> {
    sqlx::query_as::<_, ProjectRow>(
        "SELECT id, name, description, owner_id, created_at, updated_at
         FROM projects WHERE id = $1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await
}

/// Create a project and its owner membership in one transaction, so the
/// membership trigger fires iff the project exists.
pub async fn create(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
    owner_id: Uuid,
) -> Result<ProjectRow, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, ProjectRow>(
        "INSERT INTO projects (name, description, owner_id)
         VALUES ($1, $2, $3)
         RETURNING id, name, description, owner_id, created_at, updated_at",
    )
    .bind(name)
    .bind(description)
    .bind(owner_id)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("INSERT INTO project_members (project_id, user_id) VALUES ($1, $2)")
        .bind(row.id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(row)
}

pub async fn update(
    pool: &PgPool,
    project_id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Option<ProjectRow>, sqlx::Error> {
    sqlx::query_as::<_, ProjectRow>(
        "UPDATE projects
         SET name = COALESCE($2, name),
             description = COALESCE($3, description),
             updated_at = now()
         WHERE id = $1
         RETURNING id, name, description, owner_id, created_at, updated_at",
    )
    .bind(project_id)
    .bind(name)
    .bind(description)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, project_id: Uuid) -> Result<Option<ProjectRow>, sqlx::Error> {
    sqlx::query_as::<_, ProjectRow>(
        "DELETE FROM projects WHERE id = $1
         RETURNING id, name, description, owner_id, created_at, updated_at",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sprint_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn fetch(pool: &PgPool, task_id: Uuid) -> Result<Option<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        "SELECT id, project_id, sprint_id, title, description, status, assignee_id,
                created_at, updated_at
         FROM tasks WHERE id = $1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &PgPool, project_id: Uuid) -> Result<Vec<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        "SELECT id, project_id, sprint_id, title, description, status, assignee_id,
                created_at, updated_at
         FROM tasks WHERE project_id = $1
         ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

pub async fn create(
    pool: &PgPool,
    project_id: Uuid,
    sprint_id: Option<Uuid>,
    title: &str,
    description: Option<&str>,
    status: Option<&str>,
    assignee_id: Option<Uuid>,
) -> Result<TaskRow, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        "INSERT INTO tasks (project_id, sprint_id, title, description, status, assignee_id)
         VALUES ($1, $2, $3, $4, COALESCE($5, 'todo'), $6)
         RETURNING id, project_id, sprint_id, title, description, status, assignee_id,
                   created_at, updated_at",
    )
    .bind(project_id)
    .bind(sprint_id)
    .bind(title)
    .bind(description)
    .bind(status)
    .bind(assignee_id)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    task_id: Uuid,
    sprint_id: Option<Uuid>,
    title: Option<&str>,
    description: Option<&str>,
    status: Option<&str>,
    assignee_id: Option<Uuid>,
) -> Result<Option<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        "UPDATE tasks
         SET sprint_id = COALESCE($2, sprint_id),
             title = COALESCE($3, title),
             description = COALESCE($4, description),
             status = COALESCE($5, status),
             assignee_id = COALESCE($6, assignee_id),
             updated_at = now()
         WHERE id = $1
         RETURNING id, project_id, sprint_id, title, description, status, assignee_id,
                   created_at, updated_at",
    )
    .bind(task_id)
    .bind(sprint_id)
    .bind(title)
    .bind(description)
    .bind(status)
    .bind(assignee_id)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, task_id: Uuid) -> Result<Option<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        "DELETE FROM tasks WHERE id = $1
         RETURNING id, project_id, sprint_id, title, description, status, assignee_id,
                   created_at, updated_at",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SprintRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn fetch(pool: &PgPool, sprint_id: Uuid) -> Result<Option<SprintRow>, sqlx::Error> {
    sqlx::query_as::<_, SprintRow>(
        "SELECT id, project_id, name, start_date, end_date, created_at, updated_at
         FROM sprints WHERE id = $1",
    )
    .bind(sprint_id)
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &PgPool, project_id: Uuid) -> Result<Vec<SprintRow>, sqlx::Error> {
    sqlx::query_as::<_, SprintRow>(
        "SELECT id, project_id, name, start_date, end_date, created_at, updated_at
         FROM sprints WHERE project_id = $1
         ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

pub async fn create(
    pool: &PgPool,
    project_id: Uuid,
    name: &str,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Result<SprintRow, sqlx::Error> {
    sqlx::query_as::<_, SprintRow>(
        "INSERT INTO sprints (project_id, name, start_date, end_date)
         VALUES ($1, $2, $3, $4)
         RETURNING id, project_id, name, start_date, end_date, created_at, updated_at",
    )
    .bind(project_id)
    .bind(name)
    .bind(start_date)
    .bind(end_date)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    sprint_id: Uuid,
    name: Option<&str>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Result<Option<SprintRow>, sqlx::Error> {
    sqlx::query_as::<_, SprintRow>(
        "UPDATE sprints
         SET name = COALESCE($2, name),
             start_date = COALESCE($3, start_date),
             end_date = COALESCE($4, end_date),
             updated_at = now()
         WHERE id = $1
         RETURNING id, project_id, name, start_date, end_date, created_at, updated_at",
    )
    .bind(sprint_id)
    .bind(name)
    .bind(start_date)
    .bind(end_date)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, sprint_id: Uuid) -> Result<Option<SprintRow>, sqlx::Error> {
    sqlx::query_as::<_, SprintRow>(
        "DELETE FROM sprints WHERE id = $1
         RETURNING id, project_id, name, start_date, end_date, created_at, updated_at",
    )
    .bind(sprint_id)
    .fetch_optional(pool)
    .await
}

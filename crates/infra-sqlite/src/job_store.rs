// SQLite JobStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use herald_core::domain::{JobId, ScheduledJob};
use herald_core::error::Result;
use herald_core::port::JobStore;
use sqlx::SqlitePool;

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn list(&self) -> Result<Vec<ScheduledJob>> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT * FROM scheduled_jobs ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<ScheduledJob>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM scheduled_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(JobRow::into_job))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ScheduledJob>> {
        let row: Option<JobRow> =
            sqlx::query_as("SELECT * FROM scheduled_jobs WHERE name = ? ORDER BY id ASC LIMIT 1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(JobRow::into_job))
    }

    async fn save(&self, job: &ScheduledJob) -> Result<ScheduledJob> {
        let row: JobRow = if job.id == 0 {
            sqlx::query_as(
                r#"
                INSERT INTO scheduled_jobs (
                    name, schedule, is_active, description,
                    last_executed_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING *
                "#,
            )
            .bind(&job.name)
            .bind(&job.schedule)
            .bind(job.is_active)
            .bind(&job.description)
            .bind(job.last_executed_at)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?
        } else {
            // last_executed_at and created_at are owned by the firing path, never overwritten here
            sqlx::query_as(
                r#"
                INSERT INTO scheduled_jobs (
                    id, name, schedule, is_active, description,
                    last_executed_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    schedule = excluded.schedule,
                    is_active = excluded.is_active,
                    description = excluded.description,
                    updated_at = excluded.updated_at
                RETURNING *
                "#,
            )
            .bind(job.id)
            .bind(&job.name)
            .bind(&job.schedule)
            .bind(job.is_active)
            .bind(&job.description)
            .bind(job.last_executed_at)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?
        };

        Ok(row.into_job())
    }

    async fn delete(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_executed(&self, id: JobId, executed_at: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE scheduled_jobs SET last_executed_at = ? WHERE id = ?")
            .bind(executed_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    name: String,
    schedule: String,
    is_active: bool,
    description: String,
    last_executed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> ScheduledJob {
        ScheduledJob {
            id: self.id,
            name: self.name,
            schedule: self.schedule,
            is_active: self.is_active,
            description: self.description,
            last_executed_at: self.last_executed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

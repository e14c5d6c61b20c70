//! Background job database operations.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::{decode_error, Database};
use crate::errors::OrchestratorResult;
use crate::jobs::{BackgroundJob, JobFilter, JobStatus, JobType};

const JOB_COLUMNS: &str = "id, job_type, host_run_id, target_id, status, priority, retry_count, \
     max_retries, created_at, scheduled_at, started_at, completed_at, error_message, progress, \
     metadata, result";

fn row_to_job(row: &SqliteRow) -> OrchestratorResult<BackgroundJob> {
    let job_type: String = row.try_get("job_type")?;
    let status: String = row.try_get("status")?;
    let metadata: String = row.try_get("metadata")?;
    let result: Option<String> = row.try_get("result")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let max_retries: i64 = row.try_get("max_retries")?;
    let progress: i64 = row.try_get("progress")?;

    Ok(BackgroundJob {
        id: row.try_get("id")?,
        job_type: JobType::parse(&job_type).ok_or_else(|| decode_error("job_type", &job_type))?,
        host_run_id: row.try_get("host_run_id")?,
        target_id: row.try_get("target_id")?,
        status: JobStatus::parse(&status).ok_or_else(|| decode_error("status", &status))?,
        priority: row.try_get("priority")?,
        retry_count: retry_count as u32,
        max_retries: max_retries as u32,
        created_at: row.try_get("created_at")?,
        scheduled_at: row.try_get("scheduled_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        progress: progress.clamp(0, 100) as u8,
        metadata: serde_json::from_str(&metadata)?,
        result: result.map(|r| serde_json::from_str(&r)).transpose()?,
    })
}

impl Database {
    pub async fn insert_job(&self, job: &BackgroundJob) -> OrchestratorResult<()> {
        debug!("Storing job {} ({})", job.id, job.job_type.as_str());

        sqlx::query(
            r#"
            INSERT INTO background_jobs (
                id, job_type, host_run_id, target_id, status, priority, retry_count,
                max_retries, created_at, scheduled_at, started_at, completed_at,
                error_message, progress, metadata, result
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.job_type.as_str())
        .bind(&job.host_run_id)
        .bind(&job.target_id)
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(job.retry_count as i64)
        .bind(job.max_retries as i64)
        .bind(job.created_at)
        .bind(job.scheduled_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(job.progress as i64)
        .bind(serde_json::to_string(&job.metadata)?)
        .bind(job.result.as_ref().map(serde_json::to_string).transpose()?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Write the mutable columns of `job` only if the stored status still
    /// equals `expected`. Returns false when another caller got there first.
    pub async fn update_job_if_status(
        &self,
        job: &BackgroundJob,
        expected: JobStatus,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = ?, retry_count = ?, scheduled_at = ?, started_at = ?,
                completed_at = ?, error_message = ?, progress = ?, result = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.retry_count as i64)
        .bind(job.scheduled_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(job.progress as i64)
        .bind(job.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&job.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_job(&self, job_id: &str) -> OrchestratorResult<Option<BackgroundJob>> {
        let sql = format!("SELECT {} FROM background_jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    /// Newest first, capped at `limit`
    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        limit: i64,
    ) -> OrchestratorResult<Vec<BackgroundJob>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM background_jobs WHERE 1=1", JOB_COLUMNS));

        if !filter.status.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in &filter.status {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(job_type) = filter.job_type {
            query.push(" AND job_type = ").push_bind(job_type.as_str());
        }
        if let Some(target_id) = &filter.target_id {
            query.push(" AND target_id = ").push_bind(target_id.clone());
        }
        if let Some(host_run_id) = &filter.host_run_id {
            query.push(" AND host_run_id = ").push_bind(host_run_id.clone());
        }
        query.push(" ORDER BY seq DESC LIMIT ").push_bind(limit);

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Oldest-created first, the order the run enqueued them in
    pub async fn jobs_for_run(&self, host_run_id: &str) -> OrchestratorResult<Vec<BackgroundJob>> {
        let sql = format!(
            "SELECT {} FROM background_jobs WHERE host_run_id = ? ORDER BY seq ASC",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(host_run_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_job).collect()
    }

    /// The queued job a worker should pick up next: due, lowest priority value,
    /// then earliest scheduled
    pub async fn next_due_job(&self, now: DateTime<Utc>) -> OrchestratorResult<Option<BackgroundJob>> {
        let sql = format!(
            "SELECT {} FROM background_jobs WHERE status = 'queued' AND scheduled_at <= ? \
             ORDER BY priority ASC, scheduled_at ASC, seq ASC LIMIT 1",
            JOB_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn cancel_queued_jobs_for_run(
        &self,
        host_run_id: &str,
        now: DateTime<Utc>,
        reason: &str,
    ) -> OrchestratorResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = 'cancelled', completed_at = ?, error_message = ?
            WHERE host_run_id = ? AND status = 'queued'
            "#,
        )
        .bind(now)
        .bind(reason)
        .bind(host_run_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Failed jobs without an owning run that still have retry budget
    pub async fn retryable_standalone_jobs(&self) -> OrchestratorResult<Vec<BackgroundJob>> {
        let sql = format!(
            "SELECT {} FROM background_jobs WHERE status = 'failed' AND host_run_id IS NULL \
             AND retry_count < max_retries ORDER BY seq ASC",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn count_jobs_with_status(&self, status: &str) -> OrchestratorResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM background_jobs WHERE status = ?")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

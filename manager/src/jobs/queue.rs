// File: manager/src/jobs/queue.rs
//
// Durable job queue. The orchestrator only enqueues and reads; execution is
// done by an external worker that claims jobs and reports back.
//
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::types::{BackgroundJob, JobFilter, JobResult, JobStatus, NewJob};
use crate::constants;
use crate::database::Database;
use crate::errors::{OrchestratorError, OrchestratorResult};

#[derive(Clone)]
pub struct JobQueue {
    database: Arc<Database>,
    default_max_retries: u32,
}

impl JobQueue {
    pub fn new(database: Arc<Database>, default_max_retries: u32) -> Self {
        Self {
            database,
            default_max_retries,
        }
    }

    /// Insert a queued job scheduled `delay_seconds` from now
    #[instrument(skip(self, request), fields(job_type = %request.job_type.as_str(), target = %request.target_id))]
    pub async fn create(&self, request: NewJob) -> OrchestratorResult<BackgroundJob> {
        if request.target_id.trim().is_empty() {
            return Err(OrchestratorError::validation("job target id is empty"));
        }
        let delay_seconds = request.delay_seconds.unwrap_or(0);
        if !(0..=constants::jobs::MAX_DELAY_SECONDS).contains(&delay_seconds) {
            return Err(OrchestratorError::validation(format!(
                "delay_seconds must be within 0..={}",
                constants::jobs::MAX_DELAY_SECONDS
            )));
        }

        let now = Utc::now();
        let job = BackgroundJob {
            id: Uuid::new_v4().to_string(),
            job_type: request.job_type,
            host_run_id: request.host_run_id,
            target_id: request.target_id,
            status: JobStatus::Queued,
            priority: request.priority.unwrap_or(constants::jobs::DEFAULT_PRIORITY),
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(self.default_max_retries),
            created_at: now,
            scheduled_at: now + Duration::seconds(delay_seconds),
            started_at: None,
            completed_at: None,
            error_message: None,
            progress: 0,
            metadata: request.metadata,
            result: None,
        };

        self.database.insert_job(&job).await?;
        info!(
            "Queued {} job {} for {} (priority {}, scheduled {})",
            job.job_type.as_str(),
            job.id,
            job.target_id,
            job.priority,
            job.scheduled_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(job)
    }

    pub async fn status(&self, job_id: &str) -> OrchestratorResult<BackgroundJob> {
        self.database
            .get_job(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Job", job_id))
    }

    pub async fn list(&self, filter: &JobFilter) -> OrchestratorResult<Vec<BackgroundJob>> {
        self.database
            .list_jobs(filter, constants::jobs::LIST_LIMIT)
            .await
    }

    pub async fn jobs_for_run(&self, host_run_id: &str) -> OrchestratorResult<Vec<BackgroundJob>> {
        self.database.jobs_for_run(host_run_id).await
    }

    /// Job submitted through the operator surface. It may reference an
    /// existing run but never carries step or rollback markers, so it cannot
    /// move that run.
    pub async fn create_operator_job(&self, mut request: NewJob) -> OrchestratorResult<BackgroundJob> {
        if let Some(run_id) = request.host_run_id.as_deref() {
            if self.database.get_host_run(run_id).await?.is_none() {
                return Err(OrchestratorError::not_found("Host run", run_id));
            }
        }
        if request.metadata.step.is_some() || request.metadata.rollback {
            debug!("Dropping step markers from operator job for {}", request.target_id);
        }
        request.metadata.step = None;
        request.metadata.rollback = false;
        self.create(request).await
    }

    /// Only queued jobs can be cancelled
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &str) -> OrchestratorResult<BackgroundJob> {
        let mut job = self.status(job_id).await?;
        if job.status != JobStatus::Queued {
            return Err(OrchestratorError::invalid_state(format!(
                "job {} is {} and can only be cancelled while queued",
                job.id,
                job.status.as_str()
            )));
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.write(&job, JobStatus::Queued).await?;

        info!("Cancelled job {} ({})", job.id, job.job_type.as_str());
        Ok(job)
    }

    /// Re-queue a failed or cancelled job, spending one unit of its retry budget
    #[instrument(skip(self))]
    pub async fn retry(&self, job_id: &str) -> OrchestratorResult<BackgroundJob> {
        let mut job = self.status(job_id).await?;

        if !matches!(job.status, JobStatus::Failed | JobStatus::Cancelled)
            || job.retry_count >= job.max_retries
        {
            return Err(OrchestratorError::RetryExhausted {
                job_id: job.id,
                retry_count: job.retry_count,
                max_retries: job.max_retries,
            });
        }

        self.ensure_run_accepts_retry(&job).await?;

        let previous = job.status;
        job.status = JobStatus::Queued;
        job.retry_count += 1;
        job.error_message = None;
        job.completed_at = None;
        job.started_at = None;
        job.progress = 0;
        job.result = None;
        job.scheduled_at = Utc::now();
        self.write(&job, previous).await?;

        info!(
            "Re-queued job {} (retry {}/{})",
            job.id, job.retry_count, job.max_retries
        );
        Ok(job)
    }

    /// Worker call: claim the next due job, moving it to running
    pub async fn claim_next(&self, now: DateTime<Utc>) -> OrchestratorResult<Option<BackgroundJob>> {
        // A lost race simply means another worker owns that job; look again
        loop {
            let Some(mut job) = self.database.next_due_job(now).await? else {
                return Ok(None);
            };

            job.status = JobStatus::Running;
            job.started_at = Some(now);
            if self.database.update_job_if_status(&job, JobStatus::Queued).await? {
                debug!("Claimed job {} for {}", job.id, job.target_id);
                return Ok(Some(job));
            }
        }
    }

    /// Worker call: progress update for a running job
    pub async fn report_progress(&self, job_id: &str, progress: u8) -> OrchestratorResult<BackgroundJob> {
        if progress > 100 {
            return Err(OrchestratorError::validation(format!(
                "progress {} is outside 0..=100",
                progress
            )));
        }
        let mut job = self.status(job_id).await?;
        if job.status != JobStatus::Running {
            return Err(OrchestratorError::invalid_state(format!(
                "job {} is {}; progress is only accepted while running",
                job.id,
                job.status.as_str()
            )));
        }

        job.progress = progress;
        self.write(&job, JobStatus::Running).await?;
        Ok(job)
    }

    /// Worker call: terminal success
    #[instrument(skip(self, result))]
    pub async fn complete(
        &self,
        job_id: &str,
        result: Option<JobResult>,
    ) -> OrchestratorResult<BackgroundJob> {
        let mut job = self.status(job_id).await?;
        Self::ensure_edge(&job, JobStatus::Completed)?;

        job.status = JobStatus::Completed;
        job.progress = 100;
        job.completed_at = Some(Utc::now());
        job.result = result;
        self.write(&job, JobStatus::Running).await?;

        info!("Job {} ({}) completed", job.id, job.job_type.as_str());
        Ok(job)
    }

    /// Worker call: terminal failure, the message is kept verbatim
    #[instrument(skip(self))]
    pub async fn fail(&self, job_id: &str, error_message: &str) -> OrchestratorResult<BackgroundJob> {
        let mut job = self.status(job_id).await?;
        Self::ensure_edge(&job, JobStatus::Failed)?;

        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error_message = Some(error_message.to_string());
        self.write(&job, JobStatus::Running).await?;

        warn!(
            "Job {} ({}) failed on {}: {}",
            job.id,
            job.job_type.as_str(),
            job.target_id,
            error_message
        );
        Ok(job)
    }

    /// Cancel every still-queued job of a run; running jobs are left alone
    pub async fn cancel_queued_for_run(&self, host_run_id: &str, reason: &str) -> OrchestratorResult<u64> {
        let cancelled = self
            .database
            .cancel_queued_jobs_for_run(host_run_id, Utc::now(), reason)
            .await?;
        if cancelled > 0 {
            info!("Cancelled {} queued jobs of host run {}", cancelled, host_run_id);
        }
        Ok(cancelled)
    }

    /// Supervisory pass: retry failed standalone jobs that still have budget
    pub async fn retry_failed_standalone(&self) -> OrchestratorResult<u32> {
        let mut retried = 0;
        for job in self.database.retryable_standalone_jobs().await? {
            match self.retry(&job.id).await {
                Ok(_) => retried += 1,
                Err(e) => warn!("Auto-retry of job {} skipped: {}", job.id, e),
            }
        }
        Ok(retried)
    }

    /// A step job may only run again while its run is still running. Rollback
    /// jobs belong to a failed run by construction and stay retryable.
    async fn ensure_run_accepts_retry(&self, job: &BackgroundJob) -> OrchestratorResult<()> {
        let Some(run_id) = job.host_run_id.as_deref() else {
            return Ok(());
        };
        if job.metadata.rollback {
            return Ok(());
        }

        match self.database.get_host_run(run_id).await? {
            Some(run) if run.is_running() => Ok(()),
            Some(run) => Err(OrchestratorError::invalid_state(format!(
                "job {} belongs to host run {} which is {}; start a new run instead",
                job.id,
                run.id,
                run.status.as_str()
            ))),
            None => Err(OrchestratorError::invalid_state(format!(
                "job {} belongs to unknown host run {}",
                job.id, run_id
            ))),
        }
    }

    fn ensure_edge(job: &BackgroundJob, next: JobStatus) -> OrchestratorResult<()> {
        if job.status != JobStatus::Running || !job.status.can_transition_to(next) {
            return Err(OrchestratorError::invalid_state(format!(
                "job {} is {} and cannot become {}",
                job.id,
                job.status.as_str(),
                next.as_str()
            )));
        }
        Ok(())
    }

    async fn write(&self, job: &BackgroundJob, expected: JobStatus) -> OrchestratorResult<()> {
        if self.database.update_job_if_status(job, expected).await? {
            Ok(())
        } else {
            Err(OrchestratorError::invalid_state(format!(
                "job {} changed status concurrently",
                job.id
            )))
        }
    }
}

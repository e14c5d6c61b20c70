// File: manager/src/services/worker_gateway.rs
//
// Calls made by the external execution worker. Every terminal report is fed
// back into the owning host run.
//
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

use crate::errors::OrchestratorResult;
use crate::host_run::HostRunManager;
use crate::jobs::{BackgroundJob, JobQueue, JobResult};

#[derive(Clone)]
pub struct WorkerGateway {
    job_queue: Arc<JobQueue>,
    host_runs: Arc<HostRunManager>,
}

impl WorkerGateway {
    pub fn new(job_queue: Arc<JobQueue>, host_runs: Arc<HostRunManager>) -> Self {
        Self { job_queue, host_runs }
    }

    pub async fn claim(&self) -> OrchestratorResult<Option<BackgroundJob>> {
        let job = self.job_queue.claim_next(Utc::now()).await?;
        if let Some(job) = &job {
            info!("Worker claimed {} job {} for {}", job.job_type.as_str(), job.id, job.target_id);
        }
        Ok(job)
    }

    pub async fn progress(&self, job_id: &str, progress: u8) -> OrchestratorResult<BackgroundJob> {
        self.job_queue.report_progress(job_id, progress).await
    }

    pub async fn complete(&self, job_id: &str, result: Option<JobResult>) -> OrchestratorResult<BackgroundJob> {
        let job = self.job_queue.complete(job_id, result).await?;
        self.notify(&job).await;
        Ok(job)
    }

    pub async fn fail(&self, job_id: &str, error_message: &str) -> OrchestratorResult<BackgroundJob> {
        let job = self.job_queue.fail(job_id, error_message).await?;
        self.notify(&job).await;
        Ok(job)
    }

    /// Forward a job change made outside the worker, e.g. an operator cancel
    pub async fn notify(&self, job: &BackgroundJob) {
        // The job record is already final; a failed callback is only logged
        if let Err(e) = self.host_runs.on_job_update(job).await {
            error!("Failed to apply job {} to its host run: {}", job.id, e);
        }
    }
}

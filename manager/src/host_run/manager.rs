// File: manager/src/host_run/manager.rs
//
// Drives host runs through their lifecycle. Every state change goes through
// `state_lock` so a job callback and an operator action never interleave.
// Alerts are sent after the lock is released.
//
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::state::HostRunState;
use super::types::{HostRun, HostRunContext, HostRunStatus, HostRunView, StartRunRequest, StepResult};
use crate::constants;
use crate::database::Database;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::jobs::{
    BackgroundJob, JobMetadata, JobOutcome, JobPayload, JobQueue, JobStatus, JobType, NewJob,
};
use crate::planner::RollbackStrategy;
use crate::services::AlertService;

pub struct HostRunManager {
    database: Arc<Database>,
    job_queue: Arc<JobQueue>,
    alert_service: Arc<AlertService>,
    default_rollback: RollbackStrategy,
    state_lock: Mutex<()>,
}

impl HostRunManager {
    pub fn new(
        database: Arc<Database>,
        job_queue: Arc<JobQueue>,
        alert_service: Arc<AlertService>,
        default_rollback: RollbackStrategy,
    ) -> Self {
        Self {
            database,
            job_queue,
            alert_service,
            default_rollback,
            state_lock: Mutex::new(()),
        }
    }

    /// Create a run in PRECHECKS and enqueue its precheck job
    #[instrument(skip(self, request), fields(host = %request.server_id))]
    pub async fn start(&self, request: StartRunRequest) -> OrchestratorResult<HostRun> {
        if request.server_id.trim().is_empty() {
            return Err(OrchestratorError::validation("serverId is required"));
        }

        let _guard = self.state_lock.lock().await;

        if let Some(existing) = self.database.running_run_for_host(&request.server_id).await? {
            return Err(OrchestratorError::DuplicateRun {
                host_id: request.server_id,
                run_id: existing.id,
            });
        }

        let run_id = request
            .run_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.database.get_host_run(&run_id).await?.is_some() {
            return Err(OrchestratorError::validation(format!(
                "host run id {} is already in use",
                run_id
            )));
        }

        let now = Utc::now();
        let run = HostRun {
            id: run_id,
            host_id: request.server_id,
            plan_id: request.plan_id,
            state: HostRunState::Prechecks,
            status: HostRunStatus::Running,
            rollback_strategy: request.rollback_strategy.unwrap_or(self.default_rollback),
            firmware_url: request.firmware_url,
            context: HostRunContext {
                cluster: request.cluster,
                firmware_package_ids: request.firmware_package_ids,
                ..HostRunContext::default()
            },
            started_at: now,
            state_entered_at: now,
            completed_at: None,
            error_message: None,
        };

        self.database.insert_host_run(&run).await?;
        self.enqueue_step_jobs(&run).await?;

        info!(
            "Started host run {} for {} (rollback: {})",
            run.id,
            run.host_id,
            run.rollback_strategy.as_str()
        );
        Ok(run)
    }

    /// Operator-driven transition along one edge of the state graph
    #[instrument(skip(self))]
    pub async fn transition(&self, run_id: &str, target: HostRunState) -> OrchestratorResult<HostRun> {
        let guard = self.state_lock.lock().await;
        let run = self.load(run_id).await?;

        if !run.is_running() || !run.state.can_transition_to(target) {
            return Err(OrchestratorError::InvalidTransition {
                from: run.state.to_string(),
                to: target.to_string(),
            });
        }

        if target == HostRunState::Error {
            let message = format!("moved to ERROR by operator from {}", run.state);
            let failed = self.fail_run(run, message, false).await?;
            drop(guard);
            self.alert_failure(&failed).await;
            return Ok(failed);
        }

        let jobs = self.job_queue.jobs_for_run(&run.id).await?;
        if Self::current_step_failed(&run, &jobs) {
            return Err(OrchestratorError::InvalidTransition {
                from: run.state.to_string(),
                to: target.to_string(),
            });
        }

        // Pending jobs of the state being left will never be looked at again
        self.job_queue
            .cancel_queued_for_run(&run.id, "superseded by manual transition")
            .await?;
        self.enter_state(run, target).await
    }

    pub async fn status(&self, run_id: &str) -> OrchestratorResult<HostRunView> {
        let run = self.load(run_id).await?;
        let jobs = self.job_queue.jobs_for_run(&run.id).await?;

        let available_transitions = if run.is_running() {
            let step_failed = Self::current_step_failed(&run, &jobs);
            run.state
                .outgoing()
                .into_iter()
                .filter(|target| *target == HostRunState::Error || !step_failed)
                .collect()
        } else {
            Vec::new()
        };

        Ok(HostRunView {
            id: run.id,
            host_id: run.host_id,
            state: run.state,
            status: run.status,
            available_transitions,
            jobs,
            context: run.context,
            error_message: run.error_message,
        })
    }

    /// Force a running run into ERROR and drop its queued jobs. A job that is
    /// already running finishes on its own and is then ignored.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: &str) -> OrchestratorResult<HostRun> {
        let _guard = self.state_lock.lock().await;
        let mut run = self.load(run_id).await?;

        if !run.is_running() {
            return Err(OrchestratorError::invalid_state(format!(
                "host run {} is {} and can no longer be cancelled",
                run.id,
                run.status.as_str()
            )));
        }

        let now = Utc::now();
        run.state = HostRunState::Error;
        run.context.cancelled = true;
        run.context.error = Some(constants::host_run::CANCELLED_BY_OPERATOR.to_string());
        run.status = HostRunStatus::derive(run.state, true);
        run.error_message = Some(constants::host_run::CANCELLED_BY_OPERATOR.to_string());
        run.state_entered_at = now;
        run.completed_at = Some(now);
        self.database.update_host_run(&run).await?;

        self.job_queue
            .cancel_queued_for_run(&run.id, constants::host_run::CANCELLED_BY_OPERATOR)
            .await?;

        info!("Host run {} for {} cancelled by operator", run.id, run.host_id);
        Ok(run)
    }

    /// Feed a job status change back into its owning run. Returns the run
    /// when the job belonged to one.
    #[instrument(skip(self, job), fields(job = %job.id, status = %job.status.as_str()))]
    pub async fn on_job_update(&self, job: &BackgroundJob) -> OrchestratorResult<Option<HostRun>> {
        let Some(run_id) = job.host_run_id.as_deref() else {
            return Ok(None);
        };
        if !job.status.is_terminal() {
            return Ok(None);
        }

        let guard = self.state_lock.lock().await;
        let mut run = self.load(run_id).await?;

        if job.metadata.rollback {
            run.context.results.push(Self::step_result(run.state, job));
            self.database.update_host_run(&run).await?;
            info!(
                "Rollback job {} for run {} finished as {}",
                job.id,
                run.id,
                job.status.as_str()
            );
            return Ok(Some(run));
        }

        if !run.is_running() {
            debug!("Ignoring job {} for finished run {}", job.id, run.id);
            return Ok(Some(run));
        }
        if job.metadata.step != Some(run.state) {
            debug!(
                "Ignoring job {} for {:?}; run {} is in {}",
                job.id, job.metadata.step, run.id, run.state
            );
            return Ok(Some(run));
        }

        match job.status {
            JobStatus::Completed => {
                run.context.results.push(Self::step_result(run.state, job));
                if let Some(JobOutcome::Inventory { snapshot }) = job.result.as_ref().map(|r| &r.outcome) {
                    if run.state == HostRunState::Postchecks {
                        run.context.final_inventory = Some(snapshot.clone());
                    }
                }

                let jobs = self.job_queue.jobs_for_run(&run.id).await?;
                let step_done = jobs
                    .iter()
                    .filter(|j| j.metadata.step == Some(run.state) && !j.metadata.rollback)
                    .all(|j| j.status == JobStatus::Completed);

                if !step_done {
                    self.database.update_host_run(&run).await?;
                    return Ok(Some(run));
                }

                match run.state.next() {
                    Some(next) => self.enter_state(run, next).await.map(Some),
                    None => Ok(Some(run)),
                }
            }
            JobStatus::Failed => {
                run.context.results.push(Self::step_result(run.state, job));
                let reason = job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "no error message reported".to_string());
                let message = format!(
                    "{} job failed during {}: {}",
                    job.job_type.as_str(),
                    run.state,
                    reason
                );
                let allow_rollback = run.state == HostRunState::Apply;
                let failed = self.fail_run(run, message, allow_rollback).await?;
                drop(guard);
                self.alert_failure(&failed).await;
                Ok(Some(failed))
            }
            // An operator cancelled a single step job; it can be retried
            _ => {
                warn!(
                    "Step job {} of run {} was cancelled; run waits for a retry",
                    job.id, run.id
                );
                Ok(Some(run))
            }
        }
    }

    pub async fn runs_for_plan(&self, plan_id: &str) -> OrchestratorResult<Vec<HostRun>> {
        self.database.runs_for_plan(plan_id).await
    }

    /// Runs stuck in their current state for longer than `threshold_minutes`
    pub async fn stuck_runs(
        &self,
        threshold_minutes: i64,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<HostRun>> {
        self.database
            .runs_in_state_since(now - Duration::minutes(threshold_minutes))
            .await
    }

    async fn load(&self, run_id: &str) -> OrchestratorResult<HostRun> {
        self.database
            .get_host_run(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Host run", run_id))
    }

    async fn enter_state(&self, mut run: HostRun, target: HostRunState) -> OrchestratorResult<HostRun> {
        let from = run.state;
        let now = Utc::now();

        run.state = target;
        run.status = HostRunStatus::derive(target, run.context.cancelled);
        run.state_entered_at = now;
        run.context.progress = target.progress();
        if target == HostRunState::Done {
            run.completed_at = Some(now);
        }

        self.database.update_host_run(&run).await?;
        self.enqueue_step_jobs(&run).await?;

        info!("Host run {} for {}: {} -> {}", run.id, run.host_id, from, target);
        Ok(run)
    }

    async fn fail_run(
        &self,
        mut run: HostRun,
        message: String,
        allow_rollback: bool,
    ) -> OrchestratorResult<HostRun> {
        let from = run.state;
        let now = Utc::now();

        run.state = HostRunState::Error;
        run.status = HostRunStatus::derive(run.state, false);
        run.state_entered_at = now;
        run.completed_at = Some(now);
        run.context.error = Some(message.clone());
        run.error_message = Some(message.clone());
        self.database.update_host_run(&run).await?;

        self.job_queue
            .cancel_queued_for_run(&run.id, "host run failed")
            .await?;

        if allow_rollback && run.rollback_strategy == RollbackStrategy::Automatic {
            match self.enqueue_rollback(&run, &message).await {
                Ok(job_ids) => {
                    run.context.rollback_job_ids = job_ids;
                    self.database.update_host_run(&run).await?;
                }
                // Best effort: the run stays in ERROR either way
                Err(e) => error!("Failed to enqueue rollback for run {}: {}", run.id, e),
            }
        }

        error!("Host run {} for {} failed in {}: {}", run.id, run.host_id, from, message);
        Ok(run)
    }

    /// Called once `state_lock` is released so a slow webhook never blocks
    /// other runs
    async fn alert_failure(&self, run: &HostRun) {
        if let Err(e) = self.alert_service.alert_host_run_failed(run).await {
            warn!("Failed to send host run failure alert: {}", e);
        }
    }

    async fn enqueue_step_jobs(&self, run: &HostRun) -> OrchestratorResult<Vec<BackgroundJob>> {
        let mut created = Vec::new();
        for new_job in Self::step_jobs(run) {
            created.push(self.job_queue.create(new_job).await?);
        }
        Ok(created)
    }

    async fn enqueue_rollback(&self, run: &HostRun, reason: &str) -> OrchestratorResult<Vec<String>> {
        let restore = NewJob::new(JobType::FirmwareRollback, run.host_id.clone())
            .for_run(run.id.clone())
            .with_priority(0)
            .with_metadata(JobMetadata {
                rollback: true,
                ..JobMetadata::new(JobPayload::FirmwareRollback {
                    reason: reason.to_string(),
                })
            });
        let exit = NewJob::new(JobType::MaintenanceMode, run.host_id.clone())
            .for_run(run.id.clone())
            .with_priority(1)
            .with_metadata(JobMetadata {
                rollback: true,
                ..JobMetadata::new(JobPayload::MaintenanceMode {
                    enter: false,
                    evacuate_vms: false,
                })
            });

        let mut ids = Vec::new();
        for new_job in [restore, exit] {
            ids.push(self.job_queue.create(new_job).await?.id);
        }
        warn!("Automatic rollback queued for run {} ({} jobs)", run.id, ids.len());
        Ok(ids)
    }

    /// Jobs a run needs when it enters its current state
    fn step_jobs(run: &HostRun) -> Vec<NewJob> {
        let step = run.state;
        let clustered = run.context.cluster.is_some();
        let job = |job_type: JobType, payload: JobPayload| {
            NewJob::new(job_type, run.host_id.clone())
                .for_run(run.id.clone())
                .with_metadata(JobMetadata::for_step(payload, step))
        };
        let checks = |names: &[&str]| names.iter().map(|c| c.to_string()).collect::<Vec<_>>();

        match step {
            HostRunState::Prechecks => vec![job(
                JobType::HealthCheck,
                JobPayload::Precheck {
                    checks: checks(constants::host_run::PRECHECKS),
                },
            )],
            HostRunState::EnterMaint => vec![job(
                JobType::MaintenanceMode,
                JobPayload::MaintenanceMode {
                    enter: true,
                    evacuate_vms: clustered,
                },
            )],
            HostRunState::Apply => vec![job(
                JobType::FirmwareUpdate,
                JobPayload::FirmwareUpdate {
                    firmware_url: run.firmware_url.clone(),
                    package_ids: run.context.firmware_package_ids.clone(),
                },
            )],
            HostRunState::Postchecks => vec![job(
                JobType::HealthCheck,
                JobPayload::Postcheck {
                    checks: checks(constants::host_run::POSTCHECKS),
                },
            )],
            HostRunState::ExitMaint => {
                let mut jobs = vec![job(
                    JobType::MaintenanceMode,
                    JobPayload::MaintenanceMode {
                        enter: false,
                        evacuate_vms: false,
                    },
                )];
                if clustered {
                    jobs.push(job(
                        JobType::VcenterSync,
                        JobPayload::ClusterSync {
                            cluster: run.context.cluster.clone(),
                        },
                    ));
                }
                jobs
            }
            HostRunState::Done | HostRunState::Error => Vec::new(),
        }
    }

    fn current_step_failed(run: &HostRun, jobs: &[BackgroundJob]) -> bool {
        jobs.iter().any(|j| {
            j.metadata.step == Some(run.state) && !j.metadata.rollback && j.status == JobStatus::Failed
        })
    }

    fn step_result(state: HostRunState, job: &BackgroundJob) -> StepResult {
        StepResult {
            state,
            job_id: job.id.clone(),
            job_type: job.job_type,
            succeeded: job.status == JobStatus::Completed,
            outcome: job.result.as_ref().map(|r| r.outcome.clone()),
            error: job.error_message.clone(),
            recorded_at: Utc::now(),
        }
    }
}

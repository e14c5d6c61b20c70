//! Services wired on top of one in-memory database, plus a scripted worker

use fleet_manager::host_run::{HostRun, HostRunManager, StartRunRequest};
use fleet_manager::jobs::{BackgroundJob, JobQueue, JobResult};
use fleet_manager::planner::RollbackStrategy;
use fleet_manager::services::{AlertService, PlanExecutor, WorkerGateway};
use fleet_manager::Database;
use std::sync::Arc;

use super::test_database::TestDatabase;

pub struct TestHarness {
    pub db: TestDatabase,
    pub database: Arc<Database>,
    pub job_queue: Arc<JobQueue>,
    pub host_runs: Arc<HostRunManager>,
    pub gateway: WorkerGateway,
    pub executor: PlanExecutor,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::build(RollbackStrategy::Manual, AlertService::disabled(), 3).await
    }

    pub async fn with_rollback(strategy: RollbackStrategy) -> Self {
        Self::build(strategy, AlertService::disabled(), 3).await
    }

    pub async fn build(strategy: RollbackStrategy, alerts: AlertService, max_retries: u32) -> Self {
        let db = TestDatabase::new().await.expect("in-memory database");
        let database = db.database();
        let alerts = Arc::new(alerts);
        let job_queue = Arc::new(JobQueue::new(database.clone(), max_retries));
        let host_runs = Arc::new(HostRunManager::new(
            database.clone(),
            job_queue.clone(),
            alerts.clone(),
            strategy,
        ));
        let gateway = WorkerGateway::new(job_queue.clone(), host_runs.clone());
        let executor = PlanExecutor::new(database.clone(), host_runs.clone(), alerts);

        Self {
            db,
            database,
            job_queue,
            host_runs,
            gateway,
            executor,
        }
    }

    pub async fn start_run(&self, host_id: &str) -> HostRun {
        self.host_runs
            .start(StartRunRequest::new(host_id))
            .await
            .expect("run starts")
    }

    /// Claim the next due job, failing the test when the queue is empty
    pub async fn claim(&self) -> BackgroundJob {
        self.gateway
            .claim()
            .await
            .expect("claim succeeds")
            .expect("a job is queued")
    }

    /// Claim the next job and report success
    pub async fn complete_next(&self) -> BackgroundJob {
        let job = self.claim().await;
        self.gateway
            .complete(&job.id, Some(JobResult::default()))
            .await
            .expect("complete succeeds")
    }

    /// Claim the next job and report failure
    pub async fn fail_next(&self, message: &str) -> BackgroundJob {
        let job = self.claim().await;
        self.gateway
            .fail(&job.id, message)
            .await
            .expect("fail succeeds")
    }

    /// Complete queued jobs until none is left; returns how many ran
    pub async fn drain(&self) -> usize {
        let mut count = 0;
        while let Some(job) = self.gateway.claim().await.expect("claim succeeds") {
            self.gateway
                .complete(&job.id, Some(JobResult::default()))
                .await
                .expect("complete succeeds");
            count += 1;
        }
        count
    }

    pub async fn run(&self, run_id: &str) -> HostRun {
        self.database
            .get_host_run(run_id)
            .await
            .expect("run lookup succeeds")
            .expect("run exists")
    }
}

// File: manager/src/web/mod.rs
pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::discovery::DiscoveryService;
use crate::host_run::HostRunManager;
use crate::inventory::Inventory;
use crate::jobs::JobQueue;
use crate::services::{AlertService, PlanExecutor, PlanService, WorkerGateway};
use crate::workload::WorkloadAnalyzer;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub job_queue: Arc<JobQueue>,
    pub host_runs: Arc<HostRunManager>,
    pub worker_gateway: Arc<WorkerGateway>,
    pub plan_service: Arc<PlanService>,
    pub discovery_service: Arc<DiscoveryService>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        job_queue: Arc<JobQueue>,
        host_runs: Arc<HostRunManager>,
        worker_gateway: Arc<WorkerGateway>,
        plan_service: Arc<PlanService>,
        discovery_service: Arc<DiscoveryService>,
    ) -> Self {
        Self {
            config,
            job_queue,
            host_runs,
            worker_gateway,
            plan_service,
            discovery_service,
        }
    }

    /// Wire every service on top of one database. The executor is returned
    /// separately since it is driven by a background tick, not by handlers.
    pub fn assemble(config: Arc<Config>, database: Arc<Database>) -> (Self, Arc<PlanExecutor>) {
        let alert_service = Arc::new(AlertService::new(config.alarm_webhook_url.clone()));
        let job_queue = Arc::new(JobQueue::new(database.clone(), config.jobs.default_max_retries));
        let host_runs = Arc::new(HostRunManager::new(
            database.clone(),
            job_queue.clone(),
            alert_service.clone(),
            config.planner.rollback_strategy,
        ));
        let analyzer = Arc::new(WorkloadAnalyzer::new(
            database.clone(),
            config.timezone,
            config.predictor.trailing_days,
        ));
        let plan_service = Arc::new(PlanService::new(
            database.clone(),
            config.clone(),
            Inventory::from_config(&config),
            analyzer,
            host_runs.clone(),
        ));
        let worker_gateway = Arc::new(WorkerGateway::new(job_queue.clone(), host_runs.clone()));
        let discovery_service = Arc::new(DiscoveryService::new(database.clone()));
        let executor = Arc::new(PlanExecutor::new(database, host_runs.clone(), alert_service));

        let state = Self::new(
            config,
            job_queue,
            host_runs,
            worker_gateway,
            plan_service,
            discovery_service,
        );
        (state, executor)
    }
}

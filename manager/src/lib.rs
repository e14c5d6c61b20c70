pub mod config;
pub mod constants;
pub mod database;
pub mod discovery;
pub mod errors;
pub mod host_run;
pub mod inventory;
pub mod jobs;
pub mod planner;
pub mod predictor;
pub mod services;
pub mod web;
pub mod workload;

// Re-export commonly used types
pub use config::{Config, ConfigManager};
pub use database::Database;
pub use discovery::DiscoveryService;
pub use errors::{OrchestratorError, OrchestratorResult};
pub use host_run::{HostRunManager, HostRunState};
pub use inventory::Inventory;
pub use jobs::JobQueue;
pub use services::{AlertService, PlanExecutor, PlanService, WorkerGateway};
pub use web::AppState;
pub use workload::WorkloadAnalyzer;

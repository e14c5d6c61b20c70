// File: manager/src/services/mod.rs

pub mod alert_service;
pub mod plan_executor;
pub mod plan_service;
pub mod worker_gateway;

pub use alert_service::AlertService;
pub use plan_executor::{AdvanceReport, PlanExecutor};
pub use plan_service::{PlanService, PlanStatusView};
pub use worker_gateway::WorkerGateway;

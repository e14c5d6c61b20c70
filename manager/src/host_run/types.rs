//! Host run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::HostRunState;
use crate::inventory::InventorySnapshot;
use crate::jobs::{BackgroundJob, JobOutcome, JobType};
use crate::planner::RollbackStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl HostRunStatus {
    /// Status follows the state; an ERROR reached through operator
    /// cancellation reports as cancelled
    pub fn derive(state: HostRunState, cancelled: bool) -> Self {
        match state {
            HostRunState::Done => HostRunStatus::Completed,
            HostRunState::Error if cancelled => HostRunStatus::Cancelled,
            HostRunState::Error => HostRunStatus::Failed,
            _ => HostRunStatus::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostRunStatus::Running => "running",
            HostRunStatus::Completed => "completed",
            HostRunStatus::Failed => "failed",
            HostRunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "running" => HostRunStatus::Running,
            "completed" => HostRunStatus::Completed,
            "failed" => HostRunStatus::Failed,
            "cancelled" => HostRunStatus::Cancelled,
            _ => return None,
        })
    }
}

/// One job outcome recorded against the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub state: HostRunState,
    pub job_id: String,
    pub job_type: JobType,
    pub succeeded: bool,
    pub outcome: Option<JobOutcome>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRunContext {
    pub progress: u8,
    #[serde(default)]
    pub results: Vec<StepResult>,
    pub error: Option<String>,
    pub final_inventory: Option<InventorySnapshot>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub firmware_package_ids: Vec<String>,
    #[serde(default)]
    pub rollback_job_ids: Vec<String>,
    #[serde(default)]
    pub extension: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRun {
    pub id: String,
    pub host_id: String,
    pub plan_id: Option<String>,
    pub state: HostRunState,
    pub status: HostRunStatus,
    pub rollback_strategy: RollbackStrategy,
    pub firmware_url: Option<String>,
    pub context: HostRunContext,
    pub started_at: DateTime<Utc>,
    pub state_entered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl HostRun {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == HostRunStatus::Running
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// Caller-chosen id; one is generated when absent
    #[serde(default)]
    pub run_id: Option<String>,
    pub server_id: String,
    #[serde(default)]
    pub firmware_url: Option<String>,
    #[serde(default)]
    pub firmware_package_ids: Vec<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub rollback_strategy: Option<RollbackStrategy>,
    #[serde(default)]
    pub cluster: Option<String>,
}

impl StartRunRequest {
    pub fn new<S: Into<String>>(server_id: S) -> Self {
        Self {
            server_id: server_id.into(),
            ..Self::default()
        }
    }

    pub fn with_run_id<S: Into<String>>(mut self, run_id: S) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Pull-based status snapshot of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRunView {
    pub id: String,
    pub host_id: String,
    pub state: HostRunState,
    pub status: HostRunStatus,
    pub available_transitions: Vec<HostRunState>,
    pub jobs: Vec<BackgroundJob>,
    pub context: HostRunContext,
    pub error_message: Option<String>,
}

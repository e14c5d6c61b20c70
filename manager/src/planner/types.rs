// File: manager/src/planner/types.rs

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::PlannerSettings;
use crate::constants;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::inventory::FirmwarePackage;
use crate::predictor::{HourRange, MaintenanceWindowRecommendation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategy {
    Automatic,
    #[default]
    Manual,
}

impl RollbackStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackStrategy::Automatic => "automatic",
            RollbackStrategy::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "automatic" => Some(RollbackStrategy::Automatic),
            "manual" => Some(RollbackStrategy::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// One group at a time
    #[default]
    Sequential,
    /// Up to `max_concurrent_updates` groups per batch
    Parallel,
    /// Parallel batches gated on the health of the previous batch
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    InProgress,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Planned => "planned",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "planned" => PlanStatus::Planned,
            "in_progress" => PlanStatus::InProgress,
            "completed" => PlanStatus::Completed,
            "failed" => PlanStatus::Failed,
            _ => return None,
        })
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Caller-supplied plan policy; anything left out falls back to the
/// `[planner]` settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPolicy {
    #[serde(default)]
    pub max_concurrent_updates: Option<u32>,
    #[serde(default)]
    pub inter_batch_delay_minutes: Option<i64>,
    #[serde(default)]
    pub maintenance_windows: Vec<TimeWindow>,
    #[serde(default)]
    pub blackout_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub preferred_days: Vec<Weekday>,
    #[serde(default)]
    pub critical_hours: Vec<HourRange>,
    #[serde(default)]
    pub rollback_strategy: Option<RollbackStrategy>,
}

/// Fully resolved constraints recorded on the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConstraints {
    pub max_concurrent_updates: u32,
    pub inter_batch_delay_minutes: i64,
    pub avg_update_minutes_per_host: i64,
    pub maintenance_windows: Vec<TimeWindow>,
    pub blackout_dates: Vec<NaiveDate>,
    pub preferred_days: Vec<Weekday>,
    pub critical_hours: Vec<HourRange>,
    pub rollback_strategy: RollbackStrategy,
}

impl PlanConstraints {
    pub fn resolve(policy: PlanPolicy, settings: &PlannerSettings) -> OrchestratorResult<Self> {
        let constraints = Self {
            max_concurrent_updates: policy
                .max_concurrent_updates
                .unwrap_or(settings.max_concurrent_updates),
            inter_batch_delay_minutes: policy
                .inter_batch_delay_minutes
                .unwrap_or(settings.inter_batch_delay_minutes),
            avg_update_minutes_per_host: settings.avg_update_minutes_per_host,
            maintenance_windows: policy.maintenance_windows,
            blackout_dates: policy.blackout_dates,
            preferred_days: policy.preferred_days,
            critical_hours: policy.critical_hours,
            rollback_strategy: policy.rollback_strategy.unwrap_or(settings.rollback_strategy),
        };

        if constraints.max_concurrent_updates == 0 {
            return Err(OrchestratorError::validation(
                "maxConcurrentUpdates must be at least 1",
            ));
        }
        if !(0..=constants::planner::MAX_INTER_BATCH_DELAY_MINUTES).contains(&constraints.inter_batch_delay_minutes) {
            return Err(OrchestratorError::validation(format!(
                "interBatchDelayMinutes must be within 0..={}",
                constants::planner::MAX_INTER_BATCH_DELAY_MINUTES
            )));
        }
        if let Some(window) = constraints.maintenance_windows.iter().find(|w| w.end <= w.start) {
            return Err(OrchestratorError::validation(format!(
                "maintenance window starting {} ends before it starts",
                window.start
            )));
        }
        if let Some(range) = constraints.critical_hours.iter().find(|r| r.start > 23 || r.end > 24) {
            return Err(OrchestratorError::validation(format!(
                "critical hour range {}-{} is outside the day",
                range.start, range.end
            )));
        }

        Ok(constraints)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGroup {
    pub group_id: String,
    pub servers: Vec<String>,
    pub cluster: Option<String>,
    pub risk_level: RiskLevel,
    pub criticality_score: f64,
    /// Groups that must finish before this one starts
    pub dependencies: Vec<String>,
    pub scheduled_window: DateTime<Utc>,
    pub batch_index: u32,
    pub safeguards: Vec<String>,
    /// Advisory only
    #[serde(default)]
    pub recommended_window: Option<MaintenanceWindowRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyChecks {
    pub pre_update: Vec<String>,
    pub post_update: Vec<String>,
    pub rollback_validation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackTrigger {
    pub name: String,
    pub description: String,
    /// Fires without operator confirmation
    pub automatic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPlan {
    pub strategy: RollbackStrategy,
    pub checkpoints: Vec<String>,
    pub triggers: Vec<RollbackTrigger>,
    pub recovery_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEstimate {
    pub batch_index: u32,
    pub group_ids: Vec<String>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub total_duration_minutes: i64,
    pub batches: Vec<BatchEstimate>,
    pub estimated_start: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlan {
    pub id: String,
    pub name: String,
    pub plan_type: PlanType,
    pub server_groups: Vec<ServerGroup>,
    pub firmware: Vec<FirmwarePackage>,
    pub safety_checks: SafetyChecks,
    pub rollback_plan: RollbackPlan,
    pub timeline: Timeline,
    pub constraints: PlanConstraints,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

impl UpdatePlan {
    pub fn batch_count(&self) -> u32 {
        self.server_groups
            .iter()
            .map(|g| g.batch_index + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn groups_in_batch(&self, batch_index: u32) -> impl Iterator<Item = &ServerGroup> {
        self.server_groups
            .iter()
            .filter(move |g| g.batch_index == batch_index)
    }

    pub fn host_ids(&self) -> impl Iterator<Item = &str> {
        self.server_groups
            .iter()
            .flat_map(|g| g.servers.iter().map(String::as_str))
    }
}

/// Input of `createPlan`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub name: String,
    pub server_ids: Vec<String>,
    pub firmware_package_ids: Vec<String>,
    #[serde(default)]
    pub policy: PlanPolicy,
    #[serde(default)]
    pub plan_type: PlanType,
}

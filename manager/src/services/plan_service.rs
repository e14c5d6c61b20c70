// File: manager/src/services/plan_service.rs
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::constants;
use crate::database::Database;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::host_run::{HostRun, HostRunManager};
use crate::inventory::{HostProfile, Inventory};
use crate::planner::grouping::host_criticality;
use crate::planner::{build_plan, PlanConstraints, PlanInput, PlanRequest, PlanStatus, ServerGroup, UpdatePlan};
use crate::predictor::{predict, MaintenanceWindowRecommendation, PredictionConstraints};
use crate::workload::{WorkloadAnalyzer, WorkloadPattern};

/// Answer of `getPlanStatus`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatusView {
    pub id: String,
    pub name: String,
    pub status: PlanStatus,
    pub hosts: Vec<HostRun>,
}

pub struct PlanService {
    database: Arc<Database>,
    config: Arc<Config>,
    inventory: Inventory,
    analyzer: Arc<WorkloadAnalyzer>,
    host_runs: Arc<HostRunManager>,
}

impl PlanService {
    pub fn new(
        database: Arc<Database>,
        config: Arc<Config>,
        inventory: Inventory,
        analyzer: Arc<WorkloadAnalyzer>,
        host_runs: Arc<HostRunManager>,
    ) -> Self {
        Self {
            database,
            config,
            inventory,
            analyzer,
            host_runs,
        }
    }

    /// Declared hosts plus whatever discovery has reported so far
    pub async fn current_inventory(&self) -> OrchestratorResult<Inventory> {
        let mut inventory = self.inventory.clone();
        inventory.merge_discovered(&self.database.list_discovered_hosts().await?);
        Ok(inventory)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_plan(&self, request: PlanRequest) -> OrchestratorResult<UpdatePlan> {
        let now = Utc::now();
        let inventory = self.current_inventory().await?;
        let constraints = PlanConstraints::resolve(request.policy, &self.config.planner)?;

        let mut plan = build_plan(
            PlanInput {
                name: &request.name,
                server_ids: &request.server_ids,
                firmware_package_ids: &request.firmware_package_ids,
                plan_type: request.plan_type,
                constraints,
            },
            &inventory,
            self.config.timezone,
            now,
        )?;

        let prediction = self.prediction_constraints(&plan.constraints);
        let avg_minutes = plan.constraints.avg_update_minutes_per_host;
        let windows = try_join_all(
            plan.server_groups
                .iter()
                .map(|group| self.recommend_for_group(group, &inventory, &prediction, avg_minutes, now)),
        )
        .await?;
        for (group, window) in plan.server_groups.iter_mut().zip(windows) {
            group.recommended_window = window;
        }

        self.database.insert_plan(&plan).await?;
        info!("Created update plan {} ({})", plan.id, plan.name);
        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: &str) -> OrchestratorResult<UpdatePlan> {
        self.database
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Update plan", plan_id))
    }

    /// Hand the plan to the executor
    #[instrument(skip(self))]
    pub async fn start_plan(&self, plan_id: &str) -> OrchestratorResult<UpdatePlan> {
        let mut plan = self.get_plan(plan_id).await?;
        if plan.status != PlanStatus::Planned {
            return Err(OrchestratorError::invalid_state(format!(
                "plan {} is {} and cannot be started",
                plan.id,
                plan.status.as_str()
            )));
        }

        if !self
            .database
            .update_plan_status(&plan.id, PlanStatus::Planned, PlanStatus::InProgress)
            .await?
        {
            return Err(OrchestratorError::invalid_state(format!(
                "plan {} was started concurrently",
                plan.id
            )));
        }

        plan.status = PlanStatus::InProgress;
        info!("Update plan {} started", plan.id);
        Ok(plan)
    }

    pub async fn plan_status(&self, plan_id: &str) -> OrchestratorResult<PlanStatusView> {
        let plan = self.get_plan(plan_id).await?;
        let hosts = self.host_runs.runs_for_plan(&plan.id).await?;
        Ok(PlanStatusView {
            id: plan.id,
            name: plan.name,
            status: plan.status,
            hosts,
        })
    }

    pub async fn host_workload(&self, host_id: &str) -> OrchestratorResult<WorkloadPattern> {
        let inventory = self.current_inventory().await?;
        if inventory.host(host_id).is_none() {
            return Err(OrchestratorError::not_found("Host", host_id));
        }
        self.analyzer.analyze_host(host_id, Utc::now()).await
    }

    pub async fn maintenance_windows(
        &self,
        host_id: &str,
        duration_minutes: Option<i64>,
    ) -> OrchestratorResult<Vec<MaintenanceWindowRecommendation>> {
        let duration = duration_minutes.unwrap_or(self.config.planner.avg_update_minutes_per_host);
        if !(1..=constants::predictor::MAX_UPDATE_DURATION_MINUTES).contains(&duration) {
            return Err(OrchestratorError::validation(format!(
                "duration_minutes must be within 1..={}",
                constants::predictor::MAX_UPDATE_DURATION_MINUTES
            )));
        }

        let inventory = self.current_inventory().await?;
        let host = inventory
            .host(host_id)
            .ok_or_else(|| OrchestratorError::not_found("Host", host_id))?;

        let now = Utc::now();
        let pattern = self.analyzer.analyze_host(host_id, now).await?;
        let constraints = PredictionConstraints::from_settings(&self.config.predictor);
        Ok(predict(host, &pattern, duration, &constraints, self.config.timezone, now))
    }

    fn prediction_constraints(&self, plan: &PlanConstraints) -> PredictionConstraints {
        PredictionConstraints {
            blackout_dates: plan.blackout_dates.clone(),
            preferred_days: plan.preferred_days.clone(),
            critical_hours: plan.critical_hours.clone(),
            ..PredictionConstraints::from_settings(&self.config.predictor)
        }
    }

    /// Best window for the group's most critical host
    async fn recommend_for_group(
        &self,
        group: &ServerGroup,
        inventory: &Inventory,
        constraints: &PredictionConstraints,
        avg_minutes: i64,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Option<MaintenanceWindowRecommendation>> {
        let lead: Option<&HostProfile> = group
            .servers
            .iter()
            .filter_map(|id| inventory.host(id))
            .max_by(|a, b| {
                host_criticality(a)
                    .total_cmp(&host_criticality(b))
                    .then_with(|| b.id.cmp(&a.id))
            });
        let Some(lead) = lead else {
            warn!("Group {} has no host in the inventory", group.group_id);
            return Ok(None);
        };

        let duration = group.servers.len() as i64 * avg_minutes;
        let pattern = self.analyzer.analyze_host(&lead.id, now).await?;
        let best = predict(lead, &pattern, duration, constraints, self.config.timezone, now)
            .into_iter()
            .next();

        debug!(
            "Group {}: recommended window {:?}",
            group.group_id,
            best.as_ref().map(|w| w.suggested_start)
        );
        Ok(best)
    }
}

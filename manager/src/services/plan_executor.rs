// File: manager/src/services/plan_executor.rs
//
// Single executor that walks in-progress plans batch by batch. Each tick it
// starts whatever host runs are due and closes plans whose hosts are all
// terminal. Hosts of one group update one at a time.
//
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::Database;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::host_run::{HostRun, HostRunManager, HostRunStatus, StartRunRequest};
use crate::planner::{PlanStatus, PlanType, ServerGroup, UpdatePlan};
use crate::services::AlertService;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub started_runs: Vec<String>,
    pub finished_plans: Vec<(String, PlanStatus)>,
}

pub struct PlanExecutor {
    database: Arc<Database>,
    host_runs: Arc<HostRunManager>,
    alert_service: Arc<AlertService>,
}

impl PlanExecutor {
    pub fn new(database: Arc<Database>, host_runs: Arc<HostRunManager>, alert_service: Arc<AlertService>) -> Self {
        Self {
            database,
            host_runs,
            alert_service,
        }
    }

    pub async fn advance(&self, now: DateTime<Utc>) -> OrchestratorResult<AdvanceReport> {
        let mut report = AdvanceReport::default();

        for plan in self.database.plans_with_status(PlanStatus::InProgress).await? {
            // One broken plan does not hold up the others
            if let Err(e) = self.advance_plan(&plan, now, &mut report).await {
                error!("Failed to advance plan {}: {}", plan.id, e);
            }
        }

        if !report.started_runs.is_empty() || !report.finished_plans.is_empty() {
            info!(
                "Executor tick: started {} runs, finished {} plans",
                report.started_runs.len(),
                report.finished_plans.len()
            );
        }
        Ok(report)
    }

    async fn advance_plan(
        &self,
        plan: &UpdatePlan,
        now: DateTime<Utc>,
        report: &mut AdvanceReport,
    ) -> OrchestratorResult<()> {
        // latest run per host
        let latest: HashMap<String, HostRun> = self
            .host_runs
            .runs_for_plan(&plan.id)
            .await?
            .into_iter()
            .map(|run| (run.host_id.clone(), run))
            .collect();

        let finished = |host: &str| latest.get(host).map(|r| !r.is_running()).unwrap_or(false);

        let Some(current_batch) = (0..plan.batch_count())
            .find(|batch| !plan.groups_in_batch(*batch).all(|g| g.servers.iter().all(|h| finished(h.as_str()))))
        else {
            return self.finish(plan, &latest, report).await;
        };

        if plan.plan_type == PlanType::Rolling {
            let earlier_failures: Vec<&str> = plan
                .server_groups
                .iter()
                .filter(|g| g.batch_index < current_batch)
                .flat_map(|g| g.servers.iter())
                .filter(|h| latest.get(h.as_str()).map(|r| r.status) != Some(HostRunStatus::Completed))
                .map(String::as_str)
                .collect();
            if !earlier_failures.is_empty() {
                warn!(
                    "Rolling plan {} stopped before batch {}: unhealthy hosts {:?}",
                    plan.id, current_batch, earlier_failures
                );
                return self.finish(plan, &latest, report).await;
            }
        }

        let limit = match plan.plan_type {
            PlanType::Sequential => 1,
            PlanType::Parallel | PlanType::Rolling => plan.constraints.max_concurrent_updates.max(1) as usize,
        };
        let groups: Vec<&ServerGroup> = plan.groups_in_batch(current_batch).collect();
        let mut active = groups
            .iter()
            .filter(|g| Self::group_active(g, &latest))
            .count();

        for group in groups {
            if group.servers.iter().all(|h| finished(h.as_str())) {
                continue;
            }
            if group.servers.iter().any(|h| latest.get(h).map(HostRun::is_running).unwrap_or(false)) {
                continue;
            }
            let Some(next_host) = group.servers.iter().find(|h| !latest.contains_key(h.as_str())) else {
                continue;
            };

            let group_started = Self::group_active(group, &latest);
            if !group_started {
                if group.scheduled_window > now {
                    debug!("Group {} of plan {} waits for {}", group.group_id, plan.id, group.scheduled_window);
                    continue;
                }
                if active >= limit {
                    debug!("Plan {} is at its concurrency limit ({})", plan.id, limit);
                    continue;
                }
            }

            let request = StartRunRequest {
                server_id: next_host.clone(),
                firmware_url: plan.firmware.first().map(|f| f.url.clone()),
                firmware_package_ids: plan.firmware.iter().map(|f| f.id.clone()).collect(),
                plan_id: Some(plan.id.clone()),
                rollback_strategy: Some(plan.constraints.rollback_strategy),
                cluster: group.cluster.clone(),
                ..StartRunRequest::default()
            };

            match self.host_runs.start(request).await {
                Ok(run) => {
                    info!(
                        "Plan {} batch {}: started run {} for {}",
                        plan.id, current_batch, run.id, run.host_id
                    );
                    if !group_started {
                        active += 1;
                    }
                    report.started_runs.push(run.id);
                }
                // Host busy with a run outside this plan; try again next tick
                Err(OrchestratorError::DuplicateRun { run_id, .. }) => {
                    warn!(
                        "Host {} of plan {} is busy with run {}; retrying later",
                        next_host, plan.id, run_id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// A group is active once one of its hosts has a run and not all are done
    fn group_active(group: &ServerGroup, latest: &HashMap<String, HostRun>) -> bool {
        let started = group.servers.iter().any(|h| latest.contains_key(h));
        let done = group
            .servers
            .iter()
            .all(|h| latest.get(h).map(|r| !r.is_running()).unwrap_or(false));
        started && !done
    }

    async fn finish(
        &self,
        plan: &UpdatePlan,
        latest: &HashMap<String, HostRun>,
        report: &mut AdvanceReport,
    ) -> OrchestratorResult<()> {
        let failed_hosts: Vec<String> = plan
            .host_ids()
            .filter(|h| latest.get(*h).map(|r| r.status) != Some(HostRunStatus::Completed))
            .map(str::to_string)
            .collect();
        let status = if failed_hosts.is_empty() {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };

        if !self
            .database
            .update_plan_status(&plan.id, PlanStatus::InProgress, status)
            .await?
        {
            return Ok(());
        }

        info!("Update plan {} finished as {}", plan.id, status.as_str());
        report.finished_plans.push((plan.id.clone(), status));

        let mut finished = plan.clone();
        finished.status = status;
        if let Err(e) = self.alert_service.alert_plan_finished(&finished, &failed_hosts).await {
            warn!("Failed to send plan alert: {}", e);
        }
        Ok(())
    }
}

// File: manager/src/planner/engine.rs

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use super::grouping::{group_hosts, HostCluster};
use super::types::{
    BatchEstimate, PlanConstraints, PlanStatus, PlanType, RiskLevel, RollbackPlan, RollbackStrategy,
    RollbackTrigger, SafetyChecks, ServerGroup, Timeline, UpdatePlan,
};
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::inventory::{FirmwarePackage, HostProfile, Inventory};

const PRE_UPDATE_CHECKS: &[&str] = &[
    "connectivity",
    "firmware_compatibility",
    "cluster_health",
    "backup_availability",
    "maintenance_window_approval",
    "vm_migration_readiness",
];

const POST_UPDATE_CHECKS: &[&str] = &[
    "boot_status",
    "vm_status",
    "cluster_rejoin",
    "performance_baseline",
    "service_availability",
];

const ROLLBACK_VALIDATION: &[&str] = &[
    "previous_firmware_restored",
    "host_responsive",
    "cluster_membership_restored",
];

const HIGH_RISK_SAFEGUARDS: &[&str] = &[
    "verified_backup",
    "tested_rollback_procedure",
    "on_call_confirmation",
];

/// Validated input of one planning pass
pub struct PlanInput<'a> {
    pub name: &'a str,
    pub server_ids: &'a [String],
    pub firmware_package_ids: &'a [String],
    pub plan_type: PlanType,
    pub constraints: PlanConstraints,
}

/// Build a complete plan or fail before any group is produced.
pub fn build_plan(
    input: PlanInput<'_>,
    inventory: &Inventory,
    timezone: Tz,
    now: DateTime<Utc>,
) -> OrchestratorResult<UpdatePlan> {
    if input.name.trim().is_empty() {
        return Err(OrchestratorError::validation("plan name is required"));
    }
    let hosts = resolve_hosts(input.server_ids, inventory)?;
    let firmware = resolve_firmware(input.firmware_package_ids, inventory)?;

    let constraints = input.constraints;
    let groups = group_hosts(&hosts);
    let dependencies = group_dependencies(&groups)?;

    let group_limit = match input.plan_type {
        PlanType::Sequential => 1,
        PlanType::Parallel | PlanType::Rolling => constraints.max_concurrent_updates,
    };
    let batches = assign_batches(&groups, &dependencies, group_limit);

    let mut server_groups = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        let batch_index = batches[index];
        let risk_level = group.risk_level();
        server_groups.push(ServerGroup {
            group_id: group_id(index),
            servers: group.server_ids(),
            cluster: group.cluster.clone(),
            risk_level,
            criticality_score: group.criticality_score(),
            dependencies: dependencies[index].iter().map(|d| group_id(*d)).collect(),
            scheduled_window: schedule(batch_index, &constraints, timezone, now)?,
            batch_index,
            safeguards: safeguards(group, risk_level, !dependencies[index].is_empty(), input.plan_type),
            recommended_window: None,
        });
    }
    server_groups.sort_by(|a, b| {
        a.batch_index
            .cmp(&b.batch_index)
            .then_with(|| sequence_order(a, b))
    });

    let timeline = timeline(&server_groups, &constraints, now);
    let plan = UpdatePlan {
        id: Uuid::new_v4().to_string(),
        name: input.name.trim().to_string(),
        plan_type: input.plan_type,
        firmware,
        safety_checks: safety_checks(),
        rollback_plan: rollback_plan(constraints.rollback_strategy),
        timeline,
        constraints,
        status: PlanStatus::Planned,
        created_at: now,
        server_groups,
    };

    info!(
        "Planned '{}': {} hosts in {} groups over {} batches ({} minutes)",
        plan.name,
        hosts.len(),
        plan.server_groups.len(),
        plan.batch_count(),
        plan.timeline.total_duration_minutes
    );
    Ok(plan)
}

fn resolve_hosts<'a>(server_ids: &[String], inventory: &'a Inventory) -> OrchestratorResult<Vec<&'a HostProfile>> {
    if server_ids.is_empty() {
        return Err(OrchestratorError::EmptyTargetSet);
    }

    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for id in server_ids {
        if !seen.insert(id.as_str()) {
            debug!("Ignoring duplicate target {}", id);
            continue;
        }
        let host = inventory
            .host(id)
            .ok_or_else(|| OrchestratorError::validation(format!("unknown server id: {}", id)))?;
        hosts.push(host);
    }
    Ok(hosts)
}

fn resolve_firmware(package_ids: &[String], inventory: &Inventory) -> OrchestratorResult<Vec<FirmwarePackage>> {
    if package_ids.is_empty() {
        return Err(OrchestratorError::validation(
            "at least one firmware package is required",
        ));
    }

    let mut seen = HashSet::new();
    let mut packages = Vec::new();
    for id in package_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let package = inventory
            .firmware(id)
            .ok_or_else(|| OrchestratorError::validation(format!("unknown firmware package id: {}", id)))?;
        packages.push(package.clone());
    }
    Ok(packages)
}

fn group_id(index: usize) -> String {
    format!("group-{}", index + 1)
}

/// Lower risk first, then higher criticality, then id
fn sequence_order(a: &ServerGroup, b: &ServerGroup) -> std::cmp::Ordering {
    a.risk_level
        .cmp(&b.risk_level)
        .then_with(|| b.criticality_score.total_cmp(&a.criticality_score))
        .then_with(|| a.group_id.cmp(&b.group_id))
}

/// For each group, the indices of the groups it waits on. Dependencies on
/// hosts outside the plan are ignored.
fn group_dependencies(groups: &[HostCluster<'_>]) -> OrchestratorResult<Vec<Vec<usize>>> {
    let owner: HashMap<&str, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(index, g)| g.hosts.iter().map(move |h| (h.id.as_str(), index)))
        .collect();

    let mut dependencies = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        let mut deps: Vec<usize> = group
            .hosts
            .iter()
            .flat_map(|h| h.depends_on.iter())
            .filter_map(|dep| owner.get(dep.as_str()).copied())
            .filter(|dep| *dep != index)
            .collect();
        deps.sort_unstable();
        deps.dedup();
        dependencies.push(deps);
    }

    // Kahn's algorithm; anything left over sits on a cycle
    let mut indegree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: Vec<usize> = (0..groups.len()).filter(|i| indegree[*i] == 0).collect();
    let mut visited = 0;
    while let Some(node) = ready.pop() {
        visited += 1;
        for (other, deps) in dependencies.iter().enumerate() {
            if deps.contains(&node) {
                indegree[other] -= 1;
                if indegree[other] == 0 {
                    ready.push(other);
                }
            }
        }
    }
    if visited != groups.len() {
        let hosts: Vec<String> = (0..groups.len())
            .filter(|i| indegree[*i] > 0)
            .flat_map(|i| groups[i].server_ids())
            .collect();
        return Err(OrchestratorError::validation(format!(
            "dependency cycle between hosts: {}",
            hosts.join(", ")
        )));
    }

    Ok(dependencies)
}

/// Assign a batch index to every group. Groups are taken in sequence order
/// among those whose dependencies are already placed. A batch is closed when
/// it is full, when it holds a high-risk group, when the next group is high
/// risk, or when the next group depends on a member of it.
fn assign_batches(groups: &[HostCluster<'_>], dependencies: &[Vec<usize>], group_limit: u32) -> Vec<u32> {
    let risks: Vec<RiskLevel> = groups.iter().map(HostCluster::risk_level).collect();
    let scores: Vec<f64> = groups.iter().map(HostCluster::criticality_score).collect();
    let limit = group_limit.max(1) as usize;

    let mut batch_of: Vec<Option<u32>> = vec![None; groups.len()];
    let mut current: u32 = 0;
    let mut current_size = 0usize;
    let mut current_high = false;

    for _ in 0..groups.len() {
        let next = (0..groups.len())
            .filter(|i| batch_of[*i].is_none())
            .filter(|i| dependencies[*i].iter().all(|d| batch_of[*d].is_some()))
            .min_by(|a, b| {
                risks[*a]
                    .cmp(&risks[*b])
                    .then_with(|| scores[*b].total_cmp(&scores[*a]))
                    .then_with(|| a.cmp(b))
            });
        // group_dependencies already rejected cycles
        let Some(next) = next else { break };

        let high = risks[next] == RiskLevel::High;
        let waits_on_current = dependencies[next]
            .iter()
            .any(|d| batch_of[*d] == Some(current));
        let needs_new_batch =
            current_size > 0 && (current_size >= limit || current_high || high || waits_on_current);
        if needs_new_batch {
            current += 1;
            current_size = 0;
            current_high = false;
        }

        batch_of[next] = Some(current);
        current_size += 1;
        current_high |= high;
    }

    batch_of.into_iter().map(|b| b.unwrap_or(current)).collect()
}

/// Batch start time. A start that lands on a blackout date moves forward by
/// whole days.
fn schedule(
    batch_index: u32,
    constraints: &PlanConstraints,
    timezone: Tz,
    now: DateTime<Utc>,
) -> OrchestratorResult<DateTime<Utc>> {
    let out_of_range = || {
        OrchestratorError::validation(format!(
            "schedule of batch {} is outside the supported time range",
            batch_index
        ))
    };
    let delay = Duration::minutes(constraints.inter_batch_delay_minutes);
    let (base, steps) = match constraints.maintenance_windows.iter().min_by_key(|w| w.start) {
        Some(window) => (window.start, batch_index as i32),
        None => (now, batch_index as i32 + 1),
    };
    let offset = delay.checked_mul(steps).ok_or_else(out_of_range)?;
    let mut start = base.checked_add_signed(offset).ok_or_else(out_of_range)?;

    for _ in 0..=constraints.blackout_dates.len() {
        let local_date = start.with_timezone(&timezone).date_naive();
        if !constraints.blackout_dates.contains(&local_date) {
            break;
        }
        start = start.checked_add_signed(Duration::days(1)).ok_or_else(out_of_range)?;
    }
    Ok(start)
}

fn safeguards(group: &HostCluster<'_>, risk: RiskLevel, has_dependencies: bool, plan_type: PlanType) -> Vec<String> {
    let mut safeguards = Vec::new();
    if let Some(cluster) = &group.cluster {
        safeguards.push(format!("cluster_capacity:{}", cluster));
        if group.hosts.len() > 1 {
            safeguards.push("one_host_at_a_time".to_string());
        }
    }
    if has_dependencies {
        safeguards.push("dependencies_completed".to_string());
    }
    if plan_type == PlanType::Rolling {
        safeguards.push("previous_batch_healthy".to_string());
    }
    if risk == RiskLevel::High {
        safeguards.extend(HIGH_RISK_SAFEGUARDS.iter().map(|s| s.to_string()));
    }
    safeguards
}

fn safety_checks() -> SafetyChecks {
    let owned = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
    SafetyChecks {
        pre_update: owned(PRE_UPDATE_CHECKS),
        post_update: owned(POST_UPDATE_CHECKS),
        rollback_validation: owned(ROLLBACK_VALIDATION),
    }
}

fn rollback_plan(strategy: RollbackStrategy) -> RollbackPlan {
    let automatic = strategy == RollbackStrategy::Automatic;
    let trigger = |name: &str, description: &str, fires_automatically: bool| RollbackTrigger {
        name: name.to_string(),
        description: description.to_string(),
        automatic: fires_automatically,
    };

    let mut recovery_steps = Vec::new();
    if !automatic {
        recovery_steps.push("Confirm rollback with the on-call engineer".to_string());
    }
    recovery_steps.extend(
        [
            "Restore the previous firmware image",
            "Reboot and verify POST",
            "Exit maintenance mode",
            "Verify cluster membership and VM placement",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    RollbackPlan {
        strategy,
        checkpoints: vec![
            "firmware_inventory_before_update".to_string(),
            "host_configuration_backup".to_string(),
            "vm_placement_snapshot".to_string(),
        ],
        triggers: vec![
            trigger("update_timeout", "Firmware job exceeds its expected duration", automatic),
            trigger("boot_failure", "Host fails to boot after the update", automatic),
            trigger("performance_regression", "Post-check performance is below baseline", automatic),
            trigger("manual_request", "Operator requests a rollback", false),
        ],
        recovery_steps,
    }
}

fn timeline(groups: &[ServerGroup], constraints: &PlanConstraints, now: DateTime<Utc>) -> Timeline {
    let mut batches: Vec<BatchEstimate> = Vec::new();
    for group in groups {
        // hosts of one group update one after another
        let duration = group.servers.len() as i64 * constraints.avg_update_minutes_per_host;
        match batches.iter_mut().find(|b| b.batch_index == group.batch_index) {
            Some(batch) => {
                batch.group_ids.push(group.group_id.clone());
                batch.duration_minutes = batch.duration_minutes.max(duration);
            }
            None => batches.push(BatchEstimate {
                batch_index: group.batch_index,
                group_ids: vec![group.group_id.clone()],
                duration_minutes: duration,
            }),
        }
    }
    batches.sort_by_key(|b| b.batch_index);

    let gaps = batches.len().saturating_sub(1) as i64;
    let total_duration_minutes =
        batches.iter().map(|b| b.duration_minutes).sum::<i64>() + gaps * constraints.inter_batch_delay_minutes;
    let estimated_start = groups
        .iter()
        .map(|g| g.scheduled_window)
        .min()
        .unwrap_or(now);

    Timeline {
        total_duration_minutes,
        estimated_completion: Duration::try_minutes(total_duration_minutes)
            .and_then(|d| estimated_start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
        estimated_start,
        batches,
    }
}

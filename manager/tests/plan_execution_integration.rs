//! End-to-end tests: plan creation through the plan service, then execution
//! by the plan executor with a scripted worker

mod common;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use common::fixtures::*;
use fleet_manager::config::{Config, ConfigManager};
use fleet_manager::errors::OrchestratorError;
use fleet_manager::host_run::HostRunStatus;
use fleet_manager::jobs::JobResult;
use fleet_manager::planner::{PlanPolicy, PlanRequest, PlanStatus, PlanType, RollbackStrategy};
use fleet_manager::services::{AlertService, PlanService};
use fleet_manager::WorkloadAnalyzer;
use std::sync::Arc;

fn config() -> Arc<Config> {
    Arc::new(ConfigManager::parse_main_config("").unwrap())
}

fn plan_service(harness: &TestHarness) -> PlanService {
    let analyzer = Arc::new(WorkloadAnalyzer::new(harness.database.clone(), Tz::UTC, 30));
    PlanService::new(
        harness.database.clone(),
        config(),
        sample_inventory(),
        analyzer,
        harness.host_runs.clone(),
    )
}

fn request(plan_type: PlanType, max_concurrent: u32) -> PlanRequest {
    PlanRequest {
        name: "october bios".to_string(),
        server_ids: ids(&[hosts::ESX_1, hosts::ESX_2, hosts::STANDALONE]),
        firmware_package_ids: ids(&[firmware::BIOS]),
        policy: PlanPolicy {
            max_concurrent_updates: Some(max_concurrent),
            ..PlanPolicy::default()
        },
        plan_type,
    }
}

/// Far enough ahead that every batch window has opened
fn later() -> DateTime<Utc> {
    Utc::now() + Duration::days(1)
}

/// Work every queued job, failing the ones aimed at `failing_host`
async fn work_queue(harness: &TestHarness, failing_host: Option<&str>) {
    while let Some(job) = harness.gateway.claim().await.unwrap() {
        if Some(job.target_id.as_str()) == failing_host {
            harness.gateway.fail(&job.id, "host unreachable").await.unwrap();
        } else {
            harness
                .gateway
                .complete(&job.id, Some(JobResult::default()))
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_create_plan_persists_it_with_recommendations() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);

    let plan = service
        .create_plan(request(PlanType::Sequential, 2))
        .await
        .unwrap();

    assert_eq!(plan.status, PlanStatus::Planned);
    assert_eq!(plan.server_groups.len(), 2);
    assert_eq!(plan.batch_count(), 2);
    assert_eq!(plan.firmware[0].url, firmware::BIOS_URL);
    assert!(plan
        .server_groups
        .iter()
        .all(|g| g.recommended_window.is_some()));

    let stored = service.get_plan(&plan.id).await.unwrap();
    assert_eq!(stored.id, plan.id);
    assert_eq!(stored.server_groups, plan.server_groups);
}

#[tokio::test]
async fn test_create_plan_validates_targets() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);

    let empty = PlanRequest {
        server_ids: Vec::new(),
        ..request(PlanType::Parallel, 2)
    };
    assert!(matches!(
        service.create_plan(empty).await,
        Err(OrchestratorError::EmptyTargetSet)
    ));

    let unknown = PlanRequest {
        server_ids: ids(&["ghost-01"]),
        ..request(PlanType::Parallel, 2)
    };
    assert!(matches!(
        service.create_plan(unknown).await,
        Err(OrchestratorError::Validation(_))
    ));

    let zero = request(PlanType::Parallel, 0);
    assert!(matches!(
        service.create_plan(zero).await,
        Err(OrchestratorError::Validation(_))
    ));
    assert_eq!(harness.db.count_rows("update_plans").await.unwrap(), 0);
}

#[tokio::test]
async fn test_plan_can_only_be_started_once() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);
    let plan = service
        .create_plan(request(PlanType::Sequential, 1))
        .await
        .unwrap();

    let started = service.start_plan(&plan.id).await.unwrap();
    assert_eq!(started.status, PlanStatus::InProgress);

    let again = service.start_plan(&plan.id).await;
    assert!(matches!(again, Err(OrchestratorError::InvalidState(_))));

    let missing = service.start_plan("no-such-plan").await;
    assert!(matches!(missing, Err(OrchestratorError::NotFound { .. })));
}

#[tokio::test]
async fn test_planned_plan_is_not_executed() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);
    service
        .create_plan(request(PlanType::Parallel, 2))
        .await
        .unwrap();

    let report = harness.executor.advance(later()).await.unwrap();
    assert!(report.started_runs.is_empty());
}

#[tokio::test]
async fn test_sequential_plan_runs_hosts_one_at_a_time() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);
    let plan = service
        .create_plan(request(PlanType::Sequential, 2))
        .await
        .unwrap();
    service.start_plan(&plan.id).await.unwrap();

    // Nothing starts before the first batch window
    let early = harness.executor.advance(Utc::now()).await.unwrap();
    assert!(early.started_runs.is_empty());

    let mut order = Vec::new();
    for _ in 0..3 {
        let report = harness.executor.advance(later()).await.unwrap();
        assert_eq!(report.started_runs.len(), 1);
        let run = harness.run(&report.started_runs[0]).await;
        assert_eq!(run.plan_id.as_deref(), Some(plan.id.as_str()));
        order.push(run.host_id.clone());

        // A second tick while the host is busy starts nothing
        let idle = harness.executor.advance(later()).await.unwrap();
        assert!(idle.started_runs.is_empty());

        work_queue(&harness, None).await;
    }
    assert_eq!(order, ids(&[hosts::STANDALONE, hosts::ESX_1, hosts::ESX_2]));

    let report = harness.executor.advance(later()).await.unwrap();
    assert_eq!(report.finished_plans, vec![(plan.id.clone(), PlanStatus::Completed)]);

    let status = service.plan_status(&plan.id).await.unwrap();
    assert_eq!(status.status, PlanStatus::Completed);
    assert_eq!(status.hosts.len(), 3);
    assert!(status.hosts.iter().all(|r| r.status == HostRunStatus::Completed));
}

#[tokio::test]
async fn test_parallel_plan_continues_past_a_failed_host() {
    let webhook = MockWebhookServer::start().await;
    webhook.mock_success().await;
    let harness = TestHarness::build(
        RollbackStrategy::Manual,
        AlertService::new(webhook.webhook_url()),
        3,
    )
    .await;
    let service = plan_service(&harness);
    let plan = service
        .create_plan(request(PlanType::Parallel, 2))
        .await
        .unwrap();
    assert_eq!(plan.batch_count(), 1);
    service.start_plan(&plan.id).await.unwrap();

    // Both groups start together; the cluster group with its first host
    let report = harness.executor.advance(later()).await.unwrap();
    assert_eq!(report.started_runs.len(), 2);

    work_queue(&harness, Some(hosts::STANDALONE)).await;
    let report = harness.executor.advance(later()).await.unwrap();
    assert_eq!(report.started_runs.len(), 1);
    work_queue(&harness, None).await;

    let report = harness.executor.advance(later()).await.unwrap();
    assert_eq!(report.finished_plans, vec![(plan.id.clone(), PlanStatus::Failed)]);

    let failed = webhook.alerts_of_type("PlanFailed").await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["details"]["failed_hosts"][0], hosts::STANDALONE);
    assert_eq!(webhook.alerts_of_type("HostRunFailed").await.len(), 1);
}

#[tokio::test]
async fn test_rolling_plan_stops_after_an_unhealthy_batch() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);
    let plan = service
        .create_plan(request(PlanType::Rolling, 1))
        .await
        .unwrap();
    assert_eq!(plan.batch_count(), 2);
    assert!(plan
        .server_groups
        .iter()
        .filter(|g| g.batch_index > 0)
        .all(|g| g.safeguards.iter().any(|s| s == "previous_batch_healthy")));
    service.start_plan(&plan.id).await.unwrap();

    harness.executor.advance(later()).await.unwrap();
    work_queue(&harness, Some(hosts::STANDALONE)).await;

    let report = harness.executor.advance(later()).await.unwrap();
    assert!(report.started_runs.is_empty());
    assert_eq!(report.finished_plans, vec![(plan.id.clone(), PlanStatus::Failed)]);

    let status = service.plan_status(&plan.id).await.unwrap();
    assert_eq!(status.hosts.len(), 1);
}

#[tokio::test]
async fn test_busy_host_is_retried_on_a_later_tick() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);
    let plan = service
        .create_plan(request(PlanType::Sequential, 1))
        .await
        .unwrap();
    service.start_plan(&plan.id).await.unwrap();

    // An unrelated run holds the first host of the plan
    let outside = harness.start_run(hosts::STANDALONE).await;
    let report = harness.executor.advance(later()).await.unwrap();
    assert!(report.started_runs.is_empty());

    harness.host_runs.cancel(&outside.id).await.unwrap();
    let report = harness.executor.advance(later()).await.unwrap();
    assert_eq!(report.started_runs.len(), 1);
}

#[tokio::test]
async fn test_unknown_host_has_no_workload_or_windows() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);

    assert!(matches!(
        service.host_workload("ghost-01").await,
        Err(OrchestratorError::NotFound { .. })
    ));
    assert!(matches!(
        service.maintenance_windows("ghost-01", None).await,
        Err(OrchestratorError::NotFound { .. })
    ));
    assert!(matches!(
        service.maintenance_windows(hosts::ESX_1, Some(0)).await,
        Err(OrchestratorError::Validation(_))
    ));
}

#[tokio::test]
async fn test_maintenance_windows_avoid_recorded_peaks() {
    let harness = TestHarness::new().await;
    let service = plan_service(&harness);

    // Busy every afternoon of the last week
    let base = Utc::now() - Duration::days(7);
    let mut events = Vec::new();
    for day in 0..7 {
        let date = (base + Duration::days(day)).date_naive();
        for minute in [0, 10, 20, 30, 40, 50] {
            events.push(date.and_hms_opt(14, minute, 0).unwrap().and_utc());
            events.push(date.and_hms_opt(15, minute, 0).unwrap().and_utc());
        }
        events.push(date.and_hms_opt(9, 0, 0).unwrap().and_utc());
    }
    harness.db.insert_events(hosts::ESX_1, &events).await.unwrap();

    let pattern = service.host_workload(hosts::ESX_1).await.unwrap();
    assert!(pattern.peak_hours.contains(&14));
    assert!(pattern.peak_hours.contains(&15));

    let windows = service.maintenance_windows(hosts::ESX_1, Some(60)).await.unwrap();
    assert!(!windows.is_empty());
    for window in &windows {
        assert!(window.suggested_start > Utc::now());
        assert_eq!(window.suggested_end - window.suggested_start, Duration::minutes(60));
        assert!(window.confidence <= 100);
        assert!(window.risk_score <= 100);
    }
}

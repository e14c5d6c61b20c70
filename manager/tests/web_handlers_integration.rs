//! Integration tests for the HTTP surface, driven through the router with
//! `tower::ServiceExt::oneshot`

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::fixtures::*;
use fleet_manager::web::create_router;
use fleet_manager::{AppState, ConfigManager};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const INVENTORY: &str = r#"
[hosts.esx-01]
cluster = "prod-a"
ha_enabled = true
vm_count = 12
readiness = "ready"

[hosts.bare-01]
vm_count = 2

[firmware.bios-2-19]
component = "bios"
version = "2.19.1"
url = "https://firmware.example/bios-2.19.1.exe"
"#;

async fn app() -> (Router, TestConfig, TestDatabase) {
    let config_dir = TestConfigBuilder::new()
        .with_inventory("inventory.toml", INVENTORY)
        .build();
    let config = ConfigManager::new(config_dir.dir())
        .await
        .unwrap()
        .get_current_config();
    let db = TestDatabase::new().await.unwrap();
    let (state, _executor) = AppState::assemble(config, db.database());
    (create_router(state), config_dir, db)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn job_action(app: &Router, body: Value) -> (StatusCode, Value) {
    send(app, "POST", "/api/jobs/actions", Some(body)).await
}

#[tokio::test]
async fn test_job_action_create_and_status() {
    let (app, _config, _db) = app().await;

    let (status, body) = job_action(
        &app,
        json!({
            "action": "create",
            "jobData": { "type": "server_reboot", "targetId": "esx-01", "priority": 2 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["job"]["status"], "queued");
    assert_eq!(body["job"]["priority"], 2);
    assert!(body.get("error").is_none());

    let job_id = body["job"]["id"].as_str().unwrap().to_string();
    let (status, body) = job_action(&app, json!({ "action": "status", "jobId": job_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["type"], "server_reboot");
}

#[tokio::test]
async fn test_job_action_list_returns_jobs_array() {
    let (app, _config, _db) = app().await;
    for target in ["esx-01", "bare-01"] {
        job_action(
            &app,
            json!({ "action": "create", "jobData": { "type": "security_scan", "targetId": target } }),
        )
        .await;
    }

    let (status, body) = job_action(
        &app,
        json!({ "action": "list", "filters": { "targetId": "bare-01" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["targetId"], "bare-01");
}

#[tokio::test]
async fn test_job_action_errors_map_to_status_codes() {
    let (app, _config, _db) = app().await;

    let (status, body) = job_action(&app, json!({ "action": "status", "jobId": "missing" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let (status, _) = job_action(&app, json!({ "action": "cancel" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, created) = job_action(
        &app,
        json!({ "action": "create", "jobData": { "type": "health_check", "targetId": "esx-01" } }),
    )
    .await;
    let job_id = created["job"]["id"].as_str().unwrap().to_string();

    // Retrying a queued job is a conflict with its current state
    let (status, _) = job_action(&app, json!({ "action": "retry", "jobId": job_id })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", "/api/worker/claim", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = job_action(&app, json!({ "action": "cancel", "jobId": job_id })).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_out_of_range_numbers_are_bad_requests() {
    let (app, _config, db) = app().await;

    let (status, body) = job_action(
        &app,
        json!({
            "action": "create",
            "jobData": { "type": "health_check", "targetId": "esx-01", "delaySeconds": i64::MAX }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("delay_seconds"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/plans",
        Some(json!({
            "name": "slow rollout",
            "serverIds": ["esx-01", "bare-01"],
            "firmwarePackageIds": ["bios-2-19"],
            "policy": { "interBatchDelayMinutes": 1_000_000_000_000i64 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(db.count_rows("update_plans").await.unwrap(), 0);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/hosts/esx-01/maintenance-windows?duration_minutes={}", i64::MAX),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_created_job_must_reference_an_existing_run() {
    let (app, _config, _db) = app().await;

    let (status, body) = job_action(
        &app,
        json!({
            "action": "create",
            "jobData": { "type": "health_check", "targetId": "esx-01", "hostRunId": "run-404" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_worker_routes_drive_a_host_run() {
    let (app, _config, _db) = app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/host-runs",
        Some(json!({ "serverId": "bare-01", "runId": "run-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "PRECHECKS");

    let (status, body) = send(&app, "POST", "/api/worker/claim", None).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["hostRunId"], "run-1");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/worker/jobs/{}/progress", job_id),
        Some(json!({ "progress": 50 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["progress"], 50);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/worker/jobs/{}/complete", job_id),
        Some(json!({ "result": { "outcome": { "kind": "checks_passed", "checks": ["connectivity"] } } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/api/host-runs/run-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "ENTER_MAINT");
    assert_eq!(body["data"]["availableTransitions"], json!(["APPLY", "ERROR"]));

    let (_, body) = send(&app, "POST", "/api/worker/claim", None).await;
    let job_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/worker/jobs/{}/fail", job_id),
        Some(json!({ "errorMessage": "vm evacuation timed out" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/api/host-runs/run-1", None).await;
    assert_eq!(body["data"]["state"], "ERROR");
    assert_eq!(body["data"]["status"], "failed");
}

#[tokio::test]
async fn test_host_run_conflicts() {
    let (app, _config, _db) = app().await;
    send(
        &app,
        "POST",
        "/api/host-runs",
        Some(json!({ "serverId": "esx-01", "runId": "run-a" })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/host-runs",
        Some(json!({ "serverId": "esx-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        "POST",
        "/api/host-runs/run-a/transition",
        Some(json!({ "targetState": "APPLY" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/api/host-runs/run-a/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, _) = send(&app, "GET", "/api/host-runs/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_plan_routes() {
    let (app, _config, _db) = app().await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/plans",
        Some(json!({ "name": "empty", "serverIds": [], "firmwarePackageIds": ["bios-2-19"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/plans",
        Some(json!({
            "name": "october bios",
            "serverIds": ["esx-01", "bare-01"],
            "firmwarePackageIds": ["bios-2-19"],
            "planType": "parallel",
            "policy": { "maxConcurrentUpdates": 2, "rollbackStrategy": "automatic" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "planned");
    assert_eq!(body["data"]["rollbackPlan"]["strategy"], "automatic");
    let plan_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "POST", &format!("/api/plans/{}/start", plan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "in_progress");

    let (status, _) = send(&app, "POST", &format!("/api/plans/{}/start", plan_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "GET", &format!("/api/plans/{}/status", plan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hosts"], json!([]));

    let (status, _) = send(&app, "GET", "/api/plans/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_advisory_routes() {
    let (app, _config, _db) = app().await;

    let (status, body) = send(&app, "GET", "/api/hosts/esx-01/workload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["eventCount"], 0);
    assert_eq!(body["data"]["hourlyLoad"].as_array().unwrap().len(), 24);

    let (status, body) = send(
        &app,
        "GET",
        "/api/hosts/esx-01/maintenance-windows?duration_minutes=90",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, "GET", "/api/hosts/ghost/workload", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_discovery_upsert_is_idempotent() {
    let (app, _config, db) = app().await;
    let record = json!([{ "ipAddress": "10.0.20.5", "hostname": "r740-05", "model": "PowerEdge R740" }]);

    for _ in 0..2 {
        let (status, _) = send(&app, "POST", "/api/discovery/hosts", Some(record.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(db.count_rows("discovered_hosts").await.unwrap(), 1);

    let (status, body) = send(&app, "GET", "/api/discovery/hosts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["hostname"], "r740-05");

    let (status, _) = send(
        &app,
        "POST",
        "/api/discovery/hosts",
        Some(json!([{ "ipAddress": "not-an-ip", "hostname": "x" }])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Discovered hosts become plannable targets keyed by IP
    let (status, _) = send(&app, "GET", "/api/hosts/10.0.20.5/workload", None).await;
    assert_eq!(status, StatusCode::OK);
}

// File: manager/src/web/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::discovery::{DiscoveredHost, DiscoveryRecord};
use crate::errors::OrchestratorError;
use crate::host_run::{HostRun, HostRunState, HostRunView, StartRunRequest};
use crate::jobs::{BackgroundJob, BulkOutcome, BulkRequest, JobFilter, JobResult, NewJob};
use crate::planner::{PlanRequest, UpdatePlan};
use crate::predictor::MaintenanceWindowRecommendation;
use crate::services::PlanStatusView;
use crate::web::AppState;
use crate::workload::WorkloadPattern;

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn status_for(error: &OrchestratorError) -> StatusCode {
    if error.is_validation() {
        StatusCode::BAD_REQUEST
    } else if error.is_conflict() {
        StatusCode::CONFLICT
    } else if matches!(error, OrchestratorError::NotFound { .. }) {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn api_error(context: &str, error: OrchestratorError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("{} failed: {}", context, error);
    } else {
        warn!("{} rejected: {}", context, error);
    }
    (status, Json(ApiResponse::error(error.to_string())))
}

// === JOB ACTIONS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Create,
    Cancel,
    Retry,
    Status,
    List,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionRequest {
    pub action: JobAction,
    #[serde(default)]
    pub job_data: Option<NewJob>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub filters: Option<JobFilter>,
}

#[derive(Debug, Serialize)]
pub struct JobActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<BackgroundJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<BackgroundJob>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobActionResponse {
    fn job(job: BackgroundJob) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                job: Some(job),
                jobs: None,
                error: None,
            }),
        )
    }

    fn jobs(jobs: Vec<BackgroundJob>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                job: None,
                jobs: Some(jobs),
                error: None,
            }),
        )
    }

    fn failure(error: OrchestratorError) -> (StatusCode, Json<Self>) {
        let status = status_for(&error);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Job action failed: {}", error);
        }
        (
            status,
            Json(Self {
                success: false,
                job: None,
                jobs: None,
                error: Some(error.to_string()),
            }),
        )
    }
}

fn required_job_id(request: &JobActionRequest) -> Result<&str, OrchestratorError> {
    request
        .job_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| OrchestratorError::validation("jobId is required"))
}

pub async fn job_action(
    State(state): State<AppState>,
    Json(request): Json<JobActionRequest>,
) -> (StatusCode, Json<JobActionResponse>) {
    if request.action == JobAction::List {
        let filters = request.filters.clone().unwrap_or_default();
        return match state.job_queue.list(&filters).await {
            Ok(jobs) => JobActionResponse::jobs(jobs),
            Err(e) => JobActionResponse::failure(e),
        };
    }

    match run_job_action(&state, &request).await {
        Ok(job) => JobActionResponse::job(job),
        Err(e) => JobActionResponse::failure(e),
    }
}

async fn run_job_action(
    state: &AppState,
    request: &JobActionRequest,
) -> Result<BackgroundJob, OrchestratorError> {
    match request.action {
        JobAction::Create => {
            let data = request
                .job_data
                .clone()
                .ok_or_else(|| OrchestratorError::validation("jobData is required"))?;
            state.job_queue.create_operator_job(data).await
        }
        JobAction::Cancel => {
            let job = state.job_queue.cancel(required_job_id(request)?).await?;
            info!("Job {} cancelled by operator", job.id);
            state.worker_gateway.notify(&job).await;
            Ok(job)
        }
        JobAction::Retry => state.job_queue.retry(required_job_id(request)?).await,
        JobAction::Status | JobAction::List => state.job_queue.status(required_job_id(request)?).await,
    }
}

pub async fn create_bulk_jobs(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> ApiResult<BulkOutcome> {
    info!(
        "Bulk {} requested for {} targets",
        request.operation.name(),
        request.target_ids.len()
    );

    state
        .job_queue
        .create_bulk(request)
        .await
        .map(|outcome| Json(ApiResponse::success(outcome)))
        .map_err(|e| api_error("Bulk job creation", e))
}

// === WORKER ===

#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    pub progress: u8,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBody {
    #[serde(default)]
    pub result: Option<JobResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailBody {
    pub error_message: String,
}

pub async fn claim_job(State(state): State<AppState>) -> ApiResult<Option<BackgroundJob>> {
    state
        .worker_gateway
        .claim()
        .await
        .map(|job| Json(ApiResponse::success(job)))
        .map_err(|e| api_error("Job claim", e))
}

pub async fn report_job_progress(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ProgressBody>,
) -> ApiResult<BackgroundJob> {
    state
        .worker_gateway
        .progress(&job_id, body.progress)
        .await
        .map(|job| Json(ApiResponse::success(job)))
        .map_err(|e| api_error("Progress report", e))
}

pub async fn complete_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<CompleteBody>,
) -> ApiResult<BackgroundJob> {
    state
        .worker_gateway
        .complete(&job_id, body.result)
        .await
        .map(|job| Json(ApiResponse::success(job)))
        .map_err(|e| api_error("Job completion", e))
}

pub async fn fail_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<FailBody>,
) -> ApiResult<BackgroundJob> {
    state
        .worker_gateway
        .fail(&job_id, &body.error_message)
        .await
        .map(|job| Json(ApiResponse::success(job)))
        .map_err(|e| api_error("Job failure report", e))
}

// === HOST RUNS ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    pub target_state: HostRunState,
}

pub async fn start_host_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> ApiResult<HostRun> {
    info!("Host run requested for {}", request.server_id);

    state
        .host_runs
        .start(request)
        .await
        .map(|run| Json(ApiResponse::success(run)))
        .map_err(|e| api_error("Host run start", e))
}

pub async fn get_host_run_status(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<HostRunView> {
    state
        .host_runs
        .status(&run_id)
        .await
        .map(|view| Json(ApiResponse::success(view)))
        .map_err(|e| api_error("Host run status", e))
}

pub async fn transition_host_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<TransitionBody>,
) -> ApiResult<HostRun> {
    info!("Transition of run {} to {} requested", run_id, body.target_state);

    state
        .host_runs
        .transition(&run_id, body.target_state)
        .await
        .map(|run| Json(ApiResponse::success(run)))
        .map_err(|e| api_error("Host run transition", e))
}

pub async fn cancel_host_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<HostRun> {
    info!("Cancellation of run {} requested", run_id);

    state
        .host_runs
        .cancel(&run_id)
        .await
        .map(|run| Json(ApiResponse::success(run)))
        .map_err(|e| api_error("Host run cancel", e))
}

// === PLANS ===

pub async fn create_plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> ApiResult<UpdatePlan> {
    info!(
        "Plan '{}' requested for {} servers",
        request.name,
        request.server_ids.len()
    );

    state
        .plan_service
        .create_plan(request)
        .await
        .map(|plan| Json(ApiResponse::success(plan)))
        .map_err(|e| api_error("Plan creation", e))
}

pub async fn get_plan(
    Path(plan_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<UpdatePlan> {
    state
        .plan_service
        .get_plan(&plan_id)
        .await
        .map(|plan| Json(ApiResponse::success(plan)))
        .map_err(|e| api_error("Plan lookup", e))
}

pub async fn start_plan(
    Path(plan_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<UpdatePlan> {
    state
        .plan_service
        .start_plan(&plan_id)
        .await
        .map(|plan| Json(ApiResponse::success(plan)))
        .map_err(|e| api_error("Plan start", e))
}

pub async fn get_plan_status(
    Path(plan_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PlanStatusView> {
    state
        .plan_service
        .plan_status(&plan_id)
        .await
        .map(|view| Json(ApiResponse::success(view)))
        .map_err(|e| api_error("Plan status", e))
}

// === ADVISORY ===

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

pub async fn get_host_workload(
    Path(host_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<WorkloadPattern> {
    state
        .plan_service
        .host_workload(&host_id)
        .await
        .map(|pattern| Json(ApiResponse::success(pattern)))
        .map_err(|e| api_error("Workload analysis", e))
}

pub async fn get_maintenance_windows(
    Path(host_id): Path<String>,
    Query(query): Query<WindowQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<MaintenanceWindowRecommendation>> {
    state
        .plan_service
        .maintenance_windows(&host_id, query.duration_minutes)
        .await
        .map(|windows| Json(ApiResponse::success(windows)))
        .map_err(|e| api_error("Window prediction", e))
}

// === DISCOVERY ===

pub async fn upsert_discovered_hosts(
    State(state): State<AppState>,
    Json(records): Json<Vec<DiscoveryRecord>>,
) -> ApiResult<Vec<DiscoveredHost>> {
    state
        .discovery_service
        .upsert(records)
        .await
        .map(|hosts| Json(ApiResponse::success(hosts)))
        .map_err(|e| api_error("Discovery upsert", e))
}

pub async fn list_discovered_hosts(State(state): State<AppState>) -> ApiResult<Vec<DiscoveredHost>> {
    state
        .discovery_service
        .list()
        .await
        .map(|hosts| Json(ApiResponse::success(hosts)))
        .map_err(|e| api_error("Discovery listing", e))
}

// File: manager/src/web/server.rs
use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn start_web_server(state: AppState) -> Result<()> {
    let app = create_router(state.clone());
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === JOB QUEUE ROUTES ===
        .route("/api/jobs/actions", post(handlers::job_action))
        .route("/api/jobs/bulk", post(handlers::create_bulk_jobs))
        // === WORKER ROUTES ===
        .route("/api/worker/claim", post(handlers::claim_job))
        .route(
            "/api/worker/jobs/{job_id}/progress",
            post(handlers::report_job_progress),
        )
        .route(
            "/api/worker/jobs/{job_id}/complete",
            post(handlers::complete_job),
        )
        .route("/api/worker/jobs/{job_id}/fail", post(handlers::fail_job))
        // === HOST RUN ROUTES ===
        .route("/api/host-runs", post(handlers::start_host_run))
        .route("/api/host-runs/{run_id}", get(handlers::get_host_run_status))
        .route(
            "/api/host-runs/{run_id}/transition",
            post(handlers::transition_host_run),
        )
        .route(
            "/api/host-runs/{run_id}/cancel",
            post(handlers::cancel_host_run),
        )
        // === PLAN ROUTES ===
        .route("/api/plans", post(handlers::create_plan))
        .route("/api/plans/{plan_id}", get(handlers::get_plan))
        .route("/api/plans/{plan_id}/start", post(handlers::start_plan))
        .route("/api/plans/{plan_id}/status", get(handlers::get_plan_status))
        // === ADVISORY ROUTES ===
        .route(
            "/api/hosts/{host_id}/workload",
            get(handlers::get_host_workload),
        )
        .route(
            "/api/hosts/{host_id}/maintenance-windows",
            get(handlers::get_maintenance_windows),
        )
        // === DISCOVERY ROUTES ===
        .route(
            "/api/discovery/hosts",
            post(handlers::upsert_discovered_hosts).get(handlers::list_discovered_hosts),
        )
        // Add middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

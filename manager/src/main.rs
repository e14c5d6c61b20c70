// File: manager/src/main.rs
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fleet_manager::constants::intervals::WATCHDOG_INTERVAL;
use fleet_manager::web::start_web_server;
use fleet_manager::{AppState, ConfigManager, Database};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("fleet_manager=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting fleet firmware orchestrator");

    let config_manager = ConfigManager::new("config".to_string()).await?;
    let config = config_manager.get_current_config();

    info!(
        "Loaded configuration: {} hosts, {} firmware packages, timezone {}",
        config.hosts.len(),
        config.firmware.len(),
        config.timezone
    );

    let database = Arc::new(Database::new(&config.database_path).await?);

    if config.alarm_webhook_url.is_empty() {
        warn!("No alarm webhook configured; alerts will only be logged");
    } else {
        info!("Alerts enabled, webhook: {}", config.alarm_webhook_url);
    }

    let (state, executor) = AppState::assemble(config.clone(), database);
    info!("Services initialized");

    // Plan executor tick
    let tick = Duration::from_secs(config.executor_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            if let Err(e) = executor.advance(Utc::now()).await {
                error!("Plan executor tick failed: {}", e);
            }
        }
    });
    info!("Plan executor started (every {}s)", tick.as_secs());

    // Stuck-run watchdog; reports only
    let watchdog_runs = state.host_runs.clone();
    let threshold = config.stuck_run_threshold_minutes;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
        loop {
            interval.tick().await;
            match watchdog_runs.stuck_runs(threshold, Utc::now()).await {
                Ok(stuck) => {
                    for run in stuck {
                        warn!(
                            "Host run {} for {} has been in {} since {}",
                            run.id, run.host_id, run.state, run.state_entered_at
                        );
                    }
                }
                Err(e) => error!("Stuck-run check failed: {}", e),
            }
        }
    });

    if config.jobs.auto_retry_enabled {
        let job_queue = state.job_queue.clone();
        let retry_every = Duration::from_secs(config.jobs.auto_retry_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(retry_every);
            loop {
                interval.tick().await;
                match job_queue.retry_failed_standalone().await {
                    Ok(0) => {}
                    Ok(count) => info!("Auto-retry re-queued {} failed jobs", count),
                    Err(e) => error!("Auto-retry pass failed: {}", e),
                }
            }
        });
        info!("Auto-retry enabled (every {}s)", retry_every.as_secs());
    }

    start_web_server(state).await?;

    Ok(())
}

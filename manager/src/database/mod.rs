//! Database layer for the fleet orchestrator.
//!
//! This module provides SQLite persistence for:
//! - Background jobs (the durable job queue)
//! - Host runs (per-host update lifecycle)
//! - Update plans (serialized plan artifacts)
//! - Discovered hosts (idempotent by IP address)
//! - Operational events (read-only input of the workload analyzer)
//!
//! The module is organized into submodules:
//! - `jobs` - Background job rows
//! - `host_runs` - Host run rows
//! - `plans` - Update plan rows
//! - `discovery` - Discovered host upserts
//! - `events` - Operational event queries

mod discovery;
mod events;
mod host_runs;
mod jobs;
mod plans;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::errors::OrchestratorResult;

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("Failed to create parent directory {:?}: {}", parent, e);
                return Err(e.into());
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to connect to database {}: {}", database_url, e);
                return Err(e.into());
            }
        };

        let database = Self { pool };
        database.initialize_tables().await?;
        database.report_inflight_jobs().await;

        info!("Database initialized at {}", database_path);
        Ok(database)
    }

    /// Single-connection in-memory database, used by tests and dry runs
    pub async fn in_memory() -> OrchestratorResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let database = Self { pool };
        database.initialize_tables().await?;
        Ok(database)
    }

    async fn initialize_tables(&self) -> OrchestratorResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS background_jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                job_type TEXT NOT NULL,
                host_run_id TEXT,
                target_id TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                created_at DATETIME NOT NULL,
                scheduled_at DATETIME NOT NULL,
                started_at DATETIME,
                completed_at DATETIME,
                error_message TEXT,
                progress INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL,
                result TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_jobs_status_due ON background_jobs(status, priority, scheduled_at)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_host_run ON background_jobs(host_run_id)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_target ON background_jobs(target_id, seq DESC)",
            r#"
            CREATE TABLE IF NOT EXISTS host_runs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                host_id TEXT NOT NULL,
                plan_id TEXT,
                state TEXT NOT NULL,
                status TEXT NOT NULL,
                rollback_strategy TEXT NOT NULL,
                firmware_url TEXT,
                context TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                state_entered_at DATETIME NOT NULL,
                completed_at DATETIME,
                error_message TEXT
            )
            "#,
            // Backstop for the one-running-run-per-host invariant
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_host_runs_one_running ON host_runs(host_id) WHERE status = 'running'",
            "CREATE INDEX IF NOT EXISTS idx_host_runs_plan ON host_runs(plan_id)",
            r#"
            CREATE TABLE IF NOT EXISTS update_plans (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS discovered_hosts (
                ip_address TEXT PRIMARY KEY,
                hostname TEXT NOT NULL,
                model TEXT,
                service_tag TEXT,
                firmware_versions TEXT NOT NULL,
                first_seen_at DATETIME NOT NULL,
                last_seen_at DATETIME NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS operational_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                occurred_at DATETIME NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_events_host_time ON operational_events(host_id, occurred_at)",
        ];

        for sql in statements {
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("Failed to initialize schema: {}", e);
                error!("SQL was: {}", sql);
                return Err(e.into());
            }
        }

        debug!("Database tables initialized");
        Ok(())
    }

    /// Jobs left running by a previous process stay owned by their worker
    async fn report_inflight_jobs(&self) {
        match self.count_jobs_with_status("running").await {
            Ok(0) => info!("No in-flight jobs found on startup"),
            Ok(count) => warn!(
                "{} jobs were running when the manager last stopped; waiting for their workers to report",
                count
            ),
            Err(e) => warn!("Failed to count in-flight jobs on startup: {}", e),
        }
    }
}

/// Decode error for a column holding an unknown enum value
pub(crate) fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unknown value '{}' in column {}", value, column).into())
}

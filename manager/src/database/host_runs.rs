//! Host run database operations.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{decode_error, Database};
use crate::errors::OrchestratorResult;
use crate::host_run::{HostRun, HostRunState, HostRunStatus};
use crate::planner::RollbackStrategy;

const RUN_COLUMNS: &str = "id, host_id, plan_id, state, status, rollback_strategy, firmware_url, \
     context, started_at, state_entered_at, completed_at, error_message";

fn row_to_run(row: &SqliteRow) -> OrchestratorResult<HostRun> {
    let state: String = row.try_get("state")?;
    let status: String = row.try_get("status")?;
    let strategy: String = row.try_get("rollback_strategy")?;
    let context: String = row.try_get("context")?;

    Ok(HostRun {
        id: row.try_get("id")?,
        host_id: row.try_get("host_id")?,
        plan_id: row.try_get("plan_id")?,
        state: HostRunState::parse(&state).ok_or_else(|| decode_error("state", &state))?,
        status: HostRunStatus::parse(&status).ok_or_else(|| decode_error("status", &status))?,
        rollback_strategy: RollbackStrategy::parse(&strategy)
            .ok_or_else(|| decode_error("rollback_strategy", &strategy))?,
        firmware_url: row.try_get("firmware_url")?,
        context: serde_json::from_str(&context)?,
        started_at: row.try_get("started_at")?,
        state_entered_at: row.try_get("state_entered_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
    })
}

impl Database {
    pub async fn insert_host_run(&self, run: &HostRun) -> OrchestratorResult<()> {
        debug!("Storing host run {} for {}", run.id, run.host_id);

        sqlx::query(
            r#"
            INSERT INTO host_runs (
                id, host_id, plan_id, state, status, rollback_strategy, firmware_url,
                context, started_at, state_entered_at, completed_at, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.host_id)
        .bind(&run.plan_id)
        .bind(run.state.as_str())
        .bind(run.status.as_str())
        .bind(run.rollback_strategy.as_str())
        .bind(&run.firmware_url)
        .bind(serde_json::to_string(&run.context)?)
        .bind(run.started_at)
        .bind(run.state_entered_at)
        .bind(run.completed_at)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_host_run(&self, run: &HostRun) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            UPDATE host_runs
            SET state = ?, status = ?, context = ?, state_entered_at = ?,
                completed_at = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(run.state.as_str())
        .bind(run.status.as_str())
        .bind(serde_json::to_string(&run.context)?)
        .bind(run.state_entered_at)
        .bind(run.completed_at)
        .bind(&run.error_message)
        .bind(&run.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_host_run(&self, run_id: &str) -> OrchestratorResult<Option<HostRun>> {
        let sql = format!("SELECT {} FROM host_runs WHERE id = ?", RUN_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_run).transpose()
    }

    pub async fn running_run_for_host(&self, host_id: &str) -> OrchestratorResult<Option<HostRun>> {
        let sql = format!(
            "SELECT {} FROM host_runs WHERE host_id = ? AND status = 'running' LIMIT 1",
            RUN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(host_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_run).transpose()
    }

    pub async fn runs_for_plan(&self, plan_id: &str) -> OrchestratorResult<Vec<HostRun>> {
        let sql = format!(
            "SELECT {} FROM host_runs WHERE plan_id = ? ORDER BY seq ASC",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(plan_id).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_run).collect()
    }

    /// Running runs that entered their current state before `cutoff`
    pub async fn runs_in_state_since(&self, cutoff: DateTime<Utc>) -> OrchestratorResult<Vec<HostRun>> {
        let sql = format!(
            "SELECT {} FROM host_runs WHERE status = 'running' AND state_entered_at < ? ORDER BY seq ASC",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_run).collect()
    }
}

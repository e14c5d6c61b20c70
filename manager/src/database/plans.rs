//! Update plan database operations. The plan body is stored as JSON; only the
//! status column changes after creation.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::{decode_error, Database};
use crate::errors::OrchestratorResult;
use crate::planner::{PlanStatus, UpdatePlan};

fn row_to_plan(row: &SqliteRow) -> OrchestratorResult<UpdatePlan> {
    let body: String = row.try_get("body")?;
    let status: String = row.try_get("status")?;

    let mut plan: UpdatePlan = serde_json::from_str(&body)?;
    plan.status = PlanStatus::parse(&status).ok_or_else(|| decode_error("status", &status))?;
    Ok(plan)
}

impl Database {
    pub async fn insert_plan(&self, plan: &UpdatePlan) -> OrchestratorResult<()> {
        debug!("Storing update plan {} ({})", plan.id, plan.name);

        sqlx::query(
            r#"
            INSERT INTO update_plans (id, name, status, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.name)
        .bind(plan.status.as_str())
        .bind(serde_json::to_string(plan)?)
        .bind(plan.created_at)
        .bind(plan.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_plan(&self, plan_id: &str) -> OrchestratorResult<Option<UpdatePlan>> {
        let row = sqlx::query("SELECT status, body FROM update_plans WHERE id = ?")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_plan).transpose()
    }

    /// Compare-and-set on the status column; false when another caller won
    pub async fn update_plan_status(
        &self,
        plan_id: &str,
        expected: PlanStatus,
        status: PlanStatus,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE update_plans SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(plan_id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn plans_with_status(&self, status: PlanStatus) -> OrchestratorResult<Vec<UpdatePlan>> {
        let rows = sqlx::query("SELECT status, body FROM update_plans WHERE status = ? ORDER BY seq ASC")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_plan).collect()
    }
}

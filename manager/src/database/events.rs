//! Operational event queries. The table is filled by an external log shipper;
//! nothing in the manager writes to it.

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::Database;
use crate::errors::OrchestratorResult;
use crate::workload::OperationalEvent;

impl Database {
    pub async fn events_for_host_since(
        &self,
        host_id: &str,
        since: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<OperationalEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT host_id, event_type, occurred_at
            FROM operational_events
            WHERE host_id = ? AND occurred_at >= ?
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(host_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> OrchestratorResult<OperationalEvent> {
                Ok(OperationalEvent {
                    host_id: row.try_get("host_id")?,
                    event_type: row.try_get("event_type")?,
                    occurred_at: row.try_get("occurred_at")?,
                })
            })
            .collect()
    }
}

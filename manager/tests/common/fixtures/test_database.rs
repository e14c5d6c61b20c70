//! Test database utilities for in-memory SQLite testing

use anyhow::Result;
use chrono::{DateTime, Utc};
use fleet_manager::Database;
use std::sync::Arc;

/// Test database wrapper around the manager's in-memory schema
pub struct TestDatabase {
    database: Arc<Database>,
}

impl TestDatabase {
    /// Create a new in-memory test database with every table in place
    pub async fn new() -> Result<Self> {
        let database = Database::in_memory().await?;
        Ok(Self {
            database: Arc::new(database),
        })
    }

    pub fn database(&self) -> Arc<Database> {
        self.database.clone()
    }

    /// Insert operational events the way the external log shipper does
    pub async fn insert_events(&self, host_id: &str, times: &[DateTime<Utc>]) -> Result<()> {
        for occurred_at in times {
            sqlx::query(
                "INSERT INTO operational_events (host_id, event_type, occurred_at) VALUES (?, ?, ?)",
            )
            .bind(host_id)
            .bind("vm_activity")
            .bind(occurred_at)
            .execute(self.database.pool())
            .await?;
        }
        Ok(())
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.database.pool())
            .await?;
        Ok(count)
    }
}

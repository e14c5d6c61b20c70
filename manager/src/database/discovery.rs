//! Discovered host database operations.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::Database;
use crate::discovery::{DiscoveredHost, DiscoveryRecord};
use crate::errors::OrchestratorResult;

fn row_to_discovered(row: &SqliteRow) -> OrchestratorResult<DiscoveredHost> {
    let firmware_versions: String = row.try_get("firmware_versions")?;
    Ok(DiscoveredHost {
        ip_address: row.try_get("ip_address")?,
        hostname: row.try_get("hostname")?,
        model: row.try_get("model")?,
        service_tag: row.try_get("service_tag")?,
        firmware_versions: serde_json::from_str(&firmware_versions)?,
        first_seen_at: row.try_get("first_seen_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
    })
}

impl Database {
    /// Insert or refresh the row keyed by the record's IP address
    pub async fn upsert_discovered_host(
        &self,
        record: &DiscoveryRecord,
        seen_at: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        debug!("Upserting discovered host {}", record.ip_address);

        sqlx::query(
            r#"
            INSERT INTO discovered_hosts (
                ip_address, hostname, model, service_tag, firmware_versions,
                first_seen_at, last_seen_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip_address) DO UPDATE SET
                hostname = excluded.hostname,
                model = excluded.model,
                service_tag = excluded.service_tag,
                firmware_versions = excluded.firmware_versions,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(&record.ip_address)
        .bind(&record.hostname)
        .bind(&record.model)
        .bind(&record.service_tag)
        .bind(serde_json::to_string(&record.firmware_versions)?)
        .bind(seen_at)
        .bind(seen_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_discovered_host(&self, ip_address: &str) -> OrchestratorResult<Option<DiscoveredHost>> {
        let row = sqlx::query(
            r#"
            SELECT ip_address, hostname, model, service_tag, firmware_versions,
                   first_seen_at, last_seen_at
            FROM discovered_hosts
            WHERE ip_address = ?
            "#,
        )
        .bind(ip_address)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_discovered).transpose()
    }

    pub async fn list_discovered_hosts(&self) -> OrchestratorResult<Vec<DiscoveredHost>> {
        let rows = sqlx::query(
            r#"
            SELECT ip_address, hostname, model, service_tag, firmware_versions,
                   first_seen_at, last_seen_at
            FROM discovered_hosts
            ORDER BY ip_address ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_discovered).collect()
    }
}

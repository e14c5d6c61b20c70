//! Discovered host records
//!
//! The discovery scanner itself lives outside the manager. It hands over the
//! hosts it found and this module stores them, one row per IP address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::database::Database;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::inventory::FirmwareVersion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredHost {
    pub ip_address: String,
    pub hostname: String,
    pub model: Option<String>,
    pub service_tag: Option<String>,
    pub firmware_versions: Vec<FirmwareVersion>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// One host as reported by the scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    pub ip_address: String,
    pub hostname: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub service_tag: Option<String>,
    #[serde(default)]
    pub firmware_versions: Vec<FirmwareVersion>,
}

#[derive(Clone)]
pub struct DiscoveryService {
    database: Arc<Database>,
}

impl DiscoveryService {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Store every record, replacing earlier values for the same IP address.
    /// The whole batch is validated before anything is written.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn upsert(&self, records: Vec<DiscoveryRecord>) -> OrchestratorResult<Vec<DiscoveredHost>> {
        let mut normalized = Vec::with_capacity(records.len());
        for record in records {
            let ip: IpAddr = record.ip_address.trim().parse().map_err(|_| {
                OrchestratorError::validation(format!(
                    "'{}' is not a valid IP address",
                    record.ip_address
                ))
            })?;
            if record.hostname.trim().is_empty() {
                return Err(OrchestratorError::validation(format!(
                    "discovered host {} has no hostname",
                    ip
                )));
            }
            normalized.push(DiscoveryRecord {
                ip_address: ip.to_string(),
                hostname: record.hostname.trim().to_string(),
                ..record
            });
        }

        let now = Utc::now();
        let mut stored = Vec::with_capacity(normalized.len());
        for record in &normalized {
            self.database.upsert_discovered_host(record, now).await?;
            if let Some(host) = self.database.get_discovered_host(&record.ip_address).await? {
                stored.push(host);
            }
        }

        info!("Stored {} discovered hosts", stored.len());
        Ok(stored)
    }

    pub async fn list(&self) -> OrchestratorResult<Vec<DiscoveredHost>> {
        self.database.list_discovered_hosts().await
    }
}

//! Bulk operator actions over many targets
//!
//! Each operation kind expands to the standalone jobs it enqueues for one
//! target. Adding a kind means adding a variant and its expansion here.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::queue::JobQueue;
use super::types::{BackgroundJob, JobMetadata, JobPayload, JobType, NewJob};
use crate::constants;
use crate::errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BulkOperation {
    Firmware {
        firmware_url: Option<String>,
        #[serde(default)]
        package_ids: Vec<String>,
    },
    Reboot,
    Security,
    Health,
}

impl BulkOperation {
    /// Jobs needed to carry out the operation on one target
    pub fn expand(&self, target_id: &str) -> Vec<NewJob> {
        match self {
            BulkOperation::Firmware {
                firmware_url,
                package_ids,
            } => vec![NewJob::new(JobType::FirmwareUpdate, target_id).with_metadata(
                JobMetadata::new(JobPayload::FirmwareUpdate {
                    firmware_url: firmware_url.clone(),
                    package_ids: package_ids.clone(),
                }),
            )],
            BulkOperation::Reboot => vec![NewJob::new(JobType::ServerReboot, target_id)
                .with_metadata(JobMetadata::new(JobPayload::Reboot))],
            BulkOperation::Security => vec![NewJob::new(JobType::SecurityScan, target_id)
                .with_metadata(JobMetadata::new(JobPayload::SecurityScan))],
            BulkOperation::Health => vec![NewJob::new(JobType::HealthCheck, target_id)
                .with_metadata(JobMetadata::new(JobPayload::Precheck {
                    checks: constants::host_run::PRECHECKS
                        .iter()
                        .map(|c| c.to_string())
                        .collect(),
                }))],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BulkOperation::Firmware { .. } => "firmware",
            BulkOperation::Reboot => "reboot",
            BulkOperation::Security => "security",
            BulkOperation::Health => "health",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub operation: BulkOperation,
    pub target_ids: Vec<String>,
    #[serde(default)]
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub jobs: Vec<BackgroundJob>,
    pub failed_targets: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub target_id: String,
    pub error: String,
}

impl JobQueue {
    /// Enqueue `request.operation` for every target. A target that fails to
    /// enqueue is reported and does not stop the others.
    pub async fn create_bulk(&self, request: BulkRequest) -> OrchestratorResult<BulkOutcome> {
        if request.target_ids.is_empty() {
            return Err(OrchestratorError::validation(
                "bulk operation needs at least one target",
            ));
        }

        let mut targets = request.target_ids.clone();
        targets.sort();
        targets.dedup();

        let mut jobs = Vec::new();
        let mut failed_targets = Vec::new();
        for target_id in targets {
            for mut new_job in request.operation.expand(&target_id) {
                if let Some(priority) = request.priority {
                    new_job = new_job.with_priority(priority);
                }
                match self.create(new_job).await {
                    Ok(job) => jobs.push(job),
                    Err(e) => {
                        warn!("Bulk {} failed for {}: {}", request.operation.name(), target_id, e);
                        failed_targets.push(BulkFailure {
                            target_id: target_id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "Bulk {} queued {} jobs ({} targets failed)",
            request.operation.name(),
            jobs.len(),
            failed_targets.len()
        );
        Ok(BulkOutcome {
            jobs,
            failed_targets,
        })
    }
}

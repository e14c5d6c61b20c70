//! Background job records and their typed payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host_run::HostRunState;
use crate::inventory::InventorySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FirmwareUpdate,
    FirmwareRollback,
    MaintenanceMode,
    HealthCheck,
    VcenterSync,
    ServerReboot,
    SecurityScan,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FirmwareUpdate => "firmware_update",
            JobType::FirmwareRollback => "firmware_rollback",
            JobType::MaintenanceMode => "maintenance_mode",
            JobType::HealthCheck => "health_check",
            JobType::VcenterSync => "vcenter_sync",
            JobType::ServerReboot => "server_reboot",
            JobType::SecurityScan => "security_scan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "firmware_update" => JobType::FirmwareUpdate,
            "firmware_rollback" => JobType::FirmwareRollback,
            "maintenance_mode" => JobType::MaintenanceMode,
            "health_check" => JobType::HealthCheck,
            "vcenter_sync" => JobType::VcenterSync,
            "server_reboot" => JobType::ServerReboot,
            "security_scan" => JobType::SecurityScan,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => return None,
        })
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Forward-only status graph. Re-queueing a terminal job is the separate
    /// `retry` operation and is not an edge here.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

/// Known job payloads. Anything a caller needs beyond these goes into
/// [`JobMetadata::extension`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Precheck {
        checks: Vec<String>,
    },
    Postcheck {
        checks: Vec<String>,
    },
    MaintenanceMode {
        enter: bool,
        evacuate_vms: bool,
    },
    FirmwareUpdate {
        firmware_url: Option<String>,
        #[serde(default)]
        package_ids: Vec<String>,
    },
    FirmwareRollback {
        reason: String,
    },
    ClusterSync {
        cluster: Option<String>,
    },
    Reboot,
    SecurityScan,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub payload: JobPayload,
    /// Host run state this job was enqueued for, if any
    #[serde(default)]
    pub step: Option<HostRunState>,
    /// Marks cleanup jobs enqueued after a failed APPLY
    #[serde(default)]
    pub rollback: bool,
    #[serde(default)]
    pub extension: Option<Value>,
}

impl JobMetadata {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            step: None,
            rollback: false,
            extension: None,
        }
    }

    pub fn for_step(payload: JobPayload, step: HostRunState) -> Self {
        Self {
            step: Some(step),
            ..Self::new(payload)
        }
    }
}

impl Default for JobMetadata {
    fn default() -> Self {
        Self::new(JobPayload::Generic)
    }
}

/// Outcome reported by the worker together with a terminal success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    ChecksPassed { checks: Vec<String> },
    Inventory { snapshot: InventorySnapshot },
    Message { text: String },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub outcome: JobOutcome,
    #[serde(default)]
    pub extension: Option<Value>,
}

impl JobResult {
    pub fn message<S: Into<String>>(text: S) -> Self {
        Self {
            outcome: JobOutcome::Message { text: text.into() },
            extension: None,
        }
    }
}

impl Default for JobResult {
    fn default() -> Self {
        Self {
            outcome: JobOutcome::Empty,
            extension: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundJob {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub host_run_id: Option<String>,
    pub target_id: String,
    pub status: JobStatus,
    pub priority: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub progress: u8,
    pub metadata: JobMetadata,
    pub result: Option<JobResult>,
}

impl BackgroundJob {
    #[inline]
    pub fn can_retry(&self) -> bool {
        matches!(self.status, JobStatus::Failed | JobStatus::Cancelled)
            && self.retry_count < self.max_retries
    }
}

/// Creation request (`jobData` of the job action surface)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub target_id: String,
    #[serde(default)]
    pub host_run_id: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub delay_seconds: Option<i64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub metadata: JobMetadata,
}

impl NewJob {
    pub fn new<S: Into<String>>(job_type: JobType, target_id: S) -> Self {
        Self {
            job_type,
            target_id: target_id.into(),
            host_run_id: None,
            priority: None,
            delay_seconds: None,
            max_retries: None,
            metadata: JobMetadata::default(),
        }
    }

    pub fn for_run<S: Into<String>>(mut self, host_run_id: S) -> Self {
        self.host_run_id = Some(host_run_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay_seconds(mut self, delay_seconds: i64) -> Self {
        self.delay_seconds = Some(delay_seconds);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    #[serde(default)]
    pub status: Vec<JobStatus>,
    #[serde(default, rename = "type")]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub host_run_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_graph_only_moves_forward() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn string_forms_round_trip_for_every_variant() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobType::parse("vcenter_sync"), Some(JobType::VcenterSync));
        assert_eq!(JobType::parse("mystery"), None);
    }

    #[test]
    fn payload_is_tagged_by_kind() {
        let metadata = JobMetadata::new(JobPayload::MaintenanceMode {
            enter: true,
            evacuate_vms: false,
        });
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["payload"]["kind"], "maintenance_mode");
        assert_eq!(json["payload"]["enter"], true);
    }
}

// File: manager/src/services/alert_service.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants;
use crate::host_run::HostRun;
use crate::planner::{PlanStatus, UpdatePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    HostRunFailed,
    PlanCompleted,
    PlanFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub timestamp: DateTime<Utc>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    /// Host id for run alerts, plan id for plan alerts
    pub subject: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct AlertService {
    webhook_url: String,
    client: Client,
}

impl AlertService {
    pub fn new(webhook_url: String) -> Self {
        let request_timeout = Duration::from_secs(constants::alerts::WEBHOOK_TIMEOUT_SECONDS);
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build alert HTTP client, using defaults: {}", e);
                Client::new()
            });

        Self { webhook_url, client }
    }

    /// Alerting is a no-op without a configured webhook
    pub fn disabled() -> Self {
        Self::new(String::new())
    }

    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    pub async fn alert_host_run_failed(&self, run: &HostRun) -> Result<()> {
        let payload = AlertPayload {
            timestamp: Utc::now(),
            alert_type: AlertType::HostRunFailed,
            severity: AlertSeverity::Critical,
            subject: run.host_id.clone(),
            message: run
                .error_message
                .clone()
                .unwrap_or_else(|| format!("Host run {} failed", run.id)),
            details: Some(serde_json::json!({
                "host_run_id": run.id,
                "plan_id": run.plan_id,
                "state": run.state,
                "rollback_strategy": run.rollback_strategy,
                "rollback_job_ids": run.context.rollback_job_ids,
            })),
        };

        self.send_webhook(&payload).await
    }

    pub async fn alert_plan_finished(&self, plan: &UpdatePlan, failed_hosts: &[String]) -> Result<()> {
        let (alert_type, severity, message) = match plan.status {
            PlanStatus::Completed => (
                AlertType::PlanCompleted,
                AlertSeverity::Info,
                format!("Update plan '{}' completed", plan.name),
            ),
            _ => (
                AlertType::PlanFailed,
                AlertSeverity::Warning,
                format!(
                    "Update plan '{}' finished with {} failed hosts",
                    plan.name,
                    failed_hosts.len()
                ),
            ),
        };

        let payload = AlertPayload {
            timestamp: Utc::now(),
            alert_type,
            severity,
            subject: plan.id.clone(),
            message,
            details: Some(serde_json::json!({
                "status": plan.status,
                "failed_hosts": failed_hosts,
            })),
        };

        self.send_webhook(&payload).await
    }

    async fn send_webhook(&self, payload: &AlertPayload) -> Result<()> {
        if !self.is_enabled() {
            debug!("No webhook URL configured, skipping alert");
            return Ok(());
        }

        let request_timeout = Duration::from_secs(constants::alerts::WEBHOOK_TIMEOUT_SECONDS);
        match timeout(
            request_timeout,
            self.client.post(&self.webhook_url).json(payload).send(),
        )
        .await
        {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    info!("Alert sent for {}: {:?}", payload.subject, payload.alert_type);
                } else {
                    warn!("Alert webhook returned status: {} for {}", response.status(), payload.subject);
                }
            }
            Ok(Err(e)) => {
                warn!("Failed to send alert for {}: {}", payload.subject, e);
            }
            Err(_) => {
                warn!("Alert webhook timeout for {}", payload.subject);
            }
        }

        Ok(())
    }
}

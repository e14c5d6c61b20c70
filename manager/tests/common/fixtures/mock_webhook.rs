//! Mock webhook server for testing alert delivery
//!
//! Stands in for the alarm endpoint so tests can inspect the payloads
//! the manager posts.

use serde_json::Value;
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub struct MockWebhookServer {
    pub server: MockServer,
}

impl MockWebhookServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Accept every alert with 200
    pub async fn mock_success(&self) {
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Accept every alert, but only after `delay`
    pub async fn mock_slow_success(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Answer every alert with the given status code
    pub async fn mock_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(status_code))
            .mount(&self.server)
            .await;
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.server.uri())
    }

    /// JSON bodies of every alert received so far, oldest first
    pub async fn received_alerts(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|req| req.body_json::<Value>().ok())
            .collect()
    }

    pub async fn alerts_of_type(&self, alert_type: &str) -> Vec<Value> {
        self.received_alerts()
            .await
            .into_iter()
            .filter(|body| body.get("alert_type").and_then(Value::as_str) == Some(alert_type))
            .collect()
    }
}

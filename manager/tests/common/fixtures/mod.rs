//! This module provides reusable test utilities:
//! - Mock webhook server for alert delivery
//! - Test configuration builders
//! - In-memory test databases and a wired-up service harness
//! - Common test data

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod harness;
pub mod mock_webhook;
pub mod test_config;
pub mod test_data;
pub mod test_database;

// Re-export commonly used items
pub use harness::TestHarness;
pub use mock_webhook::MockWebhookServer;
pub use test_config::{TestConfig, TestConfigBuilder};
pub use test_data::*;
pub use test_database::TestDatabase;

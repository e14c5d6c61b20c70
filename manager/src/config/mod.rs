// File: manager/src/config/mod.rs
pub mod manager;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants;
use crate::inventory::Readiness;
use crate::planner::RollbackStrategy;

pub use manager::ConfigManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default)]
    pub alarm_webhook_url: String,
    #[serde(default = "default_executor_interval")]
    pub executor_interval_seconds: u64,
    #[serde(default = "default_stuck_run_threshold")]
    pub stuck_run_threshold_minutes: i64,
    #[serde(default)]
    pub planner: PlannerSettings,
    #[serde(default)]
    pub predictor: PredictorSettings,
    #[serde(default)]
    pub jobs: JobSettings,
    // Populated from the inventory files next to main.toml
    #[serde(skip)]
    pub hosts: HashMap<String, HostConfig>,
    #[serde(skip)]
    pub firmware: HashMap<String, FirmwareConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_updates: u32,
    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_minutes: i64,
    #[serde(default = "default_avg_update_minutes")]
    pub avg_update_minutes_per_host: i64,
    #[serde(default)]
    pub rollback_strategy: RollbackStrategy,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_updates: default_max_concurrent(),
            inter_batch_delay_minutes: default_inter_batch_delay(),
            avg_update_minutes_per_host: default_avg_update_minutes(),
            rollback_strategy: RollbackStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorSettings {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: i32,
    #[serde(default = "default_trailing_days")]
    pub trailing_days: i64,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            max_recommendations: default_max_recommendations(),
            min_confidence: default_min_confidence(),
            trailing_days: default_trailing_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    #[serde(default)]
    pub auto_retry_enabled: bool,
    #[serde(default = "default_auto_retry_interval")]
    pub auto_retry_interval_seconds: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            auto_retry_enabled: false,
            auto_retry_interval_seconds: default_auto_retry_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub hosts: HashMap<String, HostConfig>,
    #[serde(default)]
    pub firmware: HashMap<String, FirmwareConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub cluster: Option<String>,
    #[serde(default)]
    pub ha_enabled: bool,
    #[serde(default)]
    pub vm_count: u32,
    pub readiness: Option<Readiness>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    // Set by the loader to the inventory file the host came from
    #[serde(skip)]
    pub source_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareConfig {
    pub component: String,
    pub version: String,
    pub url: String,
}

fn default_host() -> String {
    constants::defaults::BIND_HOST.to_string()
}

fn default_port() -> u16 {
    constants::defaults::BIND_PORT
}

fn default_database_path() -> String {
    constants::defaults::DATABASE_PATH.to_string()
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_executor_interval() -> u64 {
    constants::intervals::EXECUTOR_TICK.as_secs()
}

fn default_stuck_run_threshold() -> i64 {
    constants::host_run::STUCK_RUN_THRESHOLD_MINUTES
}

fn default_max_concurrent() -> u32 {
    constants::planner::MAX_CONCURRENT_UPDATES
}

fn default_inter_batch_delay() -> i64 {
    constants::planner::INTER_BATCH_DELAY_MINUTES
}

fn default_avg_update_minutes() -> i64 {
    constants::planner::AVG_UPDATE_MINUTES_PER_HOST
}

fn default_horizon_days() -> u32 {
    constants::predictor::HORIZON_DAYS
}

fn default_max_recommendations() -> usize {
    constants::predictor::MAX_RECOMMENDATIONS
}

fn default_min_confidence() -> i32 {
    constants::predictor::MIN_CONFIDENCE
}

fn default_trailing_days() -> i64 {
    constants::workload::TRAILING_DAYS
}

fn default_max_retries() -> u32 {
    constants::jobs::DEFAULT_MAX_RETRIES
}

fn default_auto_retry_interval() -> u64 {
    constants::jobs::AUTO_RETRY_INTERVAL_SECONDS
}

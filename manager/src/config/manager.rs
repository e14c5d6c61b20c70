// File: manager/src/config/manager.rs
use super::{Config, FirmwareConfig, HostConfig, InventoryFile};
use crate::constants;
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    /// Parse `main.toml` content without loading any inventory file
    pub fn parse_main_config(content: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(content).map_err(|e| anyhow!("Failed to parse main config: {}", e))?;
        Self::validate(&config)?;
        Ok(config)
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config = Self::parse_main_config(&main_config_content)?;

        // Every other toml file in the directory is an inventory file
        let pattern = format!("{}/*.toml", config_dir);
        let mut all_hosts: HashMap<String, HostConfig> = HashMap::new();
        let mut all_firmware: HashMap<String, FirmwareConfig> = HashMap::new();

        let mut paths = Vec::new();
        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            paths.push(entry.map_err(|e| anyhow!("Glob entry error: {}", e))?);
        }
        paths.sort();

        for path in paths {
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename"))?
                .to_string();

            if filename == "main.toml" {
                continue;
            }

            debug!("Loading inventory file: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let inventory: InventoryFile = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            for (host_id, mut host_config) in inventory.hosts {
                if let Some(existing) = all_hosts.get(&host_id) {
                    return Err(anyhow!(
                        "Host '{}' declared in both {} and {}",
                        host_id,
                        existing.source_file,
                        filename
                    ));
                }
                host_config.source_file = filename.clone();
                all_hosts.insert(host_id, host_config);
            }

            for (package_id, package) in inventory.firmware {
                if all_firmware.contains_key(&package_id) {
                    return Err(anyhow!(
                        "Firmware package '{}' declared more than once (again in {})",
                        package_id,
                        filename
                    ));
                }
                all_firmware.insert(package_id, package);
            }
        }

        config.hosts = all_hosts;
        config.firmware = all_firmware;

        info!(
            "Loaded {} hosts and {} firmware packages from {}",
            config.hosts.len(),
            config.firmware.len(),
            config_dir
        );

        Ok(config)
    }

    fn validate(config: &Config) -> Result<()> {
        if config.planner.max_concurrent_updates == 0 {
            return Err(anyhow!("planner.max_concurrent_updates must be at least 1"));
        }
        if !(0..=constants::planner::MAX_INTER_BATCH_DELAY_MINUTES).contains(&config.planner.inter_batch_delay_minutes) {
            return Err(anyhow!(
                "planner.inter_batch_delay_minutes must be within 0..={}",
                constants::planner::MAX_INTER_BATCH_DELAY_MINUTES
            ));
        }
        if !(1..=constants::predictor::MAX_UPDATE_DURATION_MINUTES).contains(&config.planner.avg_update_minutes_per_host) {
            return Err(anyhow!(
                "planner.avg_update_minutes_per_host must be within 1..={}",
                constants::predictor::MAX_UPDATE_DURATION_MINUTES
            ));
        }
        if !(1..=constants::predictor::MAX_HORIZON_DAYS).contains(&config.predictor.horizon_days) {
            return Err(anyhow!(
                "predictor.horizon_days must be within 1..={}",
                constants::predictor::MAX_HORIZON_DAYS
            ));
        }
        if !(1..=constants::workload::MAX_TRAILING_DAYS).contains(&config.predictor.trailing_days) {
            return Err(anyhow!(
                "predictor.trailing_days must be within 1..={}",
                constants::workload::MAX_TRAILING_DAYS
            ));
        }
        if !(1..=constants::host_run::MAX_STUCK_RUN_THRESHOLD_MINUTES).contains(&config.stuck_run_threshold_minutes) {
            return Err(anyhow!(
                "stuck_run_threshold_minutes must be within 1..={}",
                constants::host_run::MAX_STUCK_RUN_THRESHOLD_MINUTES
            ));
        }
        if config.executor_interval_seconds == 0 {
            return Err(anyhow!("executor_interval_seconds must be at least 1"));
        }
        Ok(())
    }
}

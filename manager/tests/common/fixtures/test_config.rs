//! Test configuration builder writing a config directory under a temp dir

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for a `main.toml` plus any number of inventory files
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_toml: String,
    inventory_files: Vec<(String, String)>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            main_toml: default_main_toml(),
            inventory_files: Vec::new(),
        }
    }

    /// Replace the whole `main.toml`
    pub fn with_main_toml(mut self, content: &str) -> Self {
        self.main_toml = content.to_string();
        self
    }

    /// Add an inventory file next to `main.toml`
    pub fn with_inventory(mut self, file_name: &str, content: &str) -> Self {
        self.inventory_files
            .push((file_name.to_string(), content.to_string()));
        self
    }

    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), &self.main_toml).expect("Failed to write main.toml");
        for (name, content) in &self.inventory_files {
            fs::write(config_dir.join(name), content).expect("Failed to write inventory file");
        }

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Config directory that lives as long as this value
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestConfig {
    pub fn dir(&self) -> String {
        self.config_dir.display().to_string()
    }
}

fn default_main_toml() -> String {
    r#"
host = "127.0.0.1"
port = 18095
database_path = "data/test.db"
timezone = "UTC"
"#
    .to_string()
}

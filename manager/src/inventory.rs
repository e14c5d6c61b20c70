// File: manager/src/inventory.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::Config;
use crate::discovery::DiscoveredHost;

/// Result of the last readiness check run against a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub component: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySnapshot {
    pub firmware_versions: Vec<FirmwareVersion>,
    pub collected_at: DateTime<Utc>,
}

/// Facts the planner and predictor need about one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostProfile {
    pub id: String,
    pub hostname: String,
    pub ip_address: Option<String>,
    pub cluster: Option<String>,
    pub ha_enabled: bool,
    pub vm_count: u32,
    pub readiness: Option<Readiness>,
    /// Hosts whose update must finish before this one starts
    pub depends_on: Vec<String>,
}

impl HostProfile {
    pub fn standalone<S: Into<String>>(id: S) -> Self {
        let id = id.into();
        Self {
            hostname: id.clone(),
            id,
            ip_address: None,
            cluster: None,
            ha_enabled: false,
            vm_count: 0,
            readiness: None,
            depends_on: Vec::new(),
        }
    }

    pub fn in_cluster<S: Into<String>>(mut self, cluster: S) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_ha(mut self, ha_enabled: bool) -> Self {
        self.ha_enabled = ha_enabled;
        self
    }

    pub fn with_vms(mut self, vm_count: u32) -> Self {
        self.vm_count = vm_count;
        self
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn depending_on<S: Into<String>>(mut self, host_id: S) -> Self {
        self.depends_on.push(host_id.into());
        self
    }

    #[inline]
    pub fn is_clustered(&self) -> bool {
        self.cluster.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwarePackage {
    pub id: String,
    pub component: String,
    pub version: String,
    pub url: String,
}

/// Hosts and firmware packages known to the manager
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: HashMap<String, HostProfile>,
    firmware: HashMap<String, FirmwarePackage>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let hosts = config
            .hosts
            .iter()
            .map(|(id, host)| {
                let profile = HostProfile {
                    id: id.clone(),
                    hostname: host.hostname.clone().unwrap_or_else(|| id.clone()),
                    ip_address: host.ip_address.clone(),
                    cluster: host.cluster.clone(),
                    ha_enabled: host.ha_enabled,
                    vm_count: host.vm_count,
                    readiness: host.readiness,
                    depends_on: host.depends_on.clone(),
                };
                (id.clone(), profile)
            })
            .collect();

        let firmware = config
            .firmware
            .iter()
            .map(|(id, package)| {
                (
                    id.clone(),
                    FirmwarePackage {
                        id: id.clone(),
                        component: package.component.clone(),
                        version: package.version.clone(),
                        url: package.url.clone(),
                    },
                )
            })
            .collect();

        Self { hosts, firmware }
    }

    pub fn with_host(mut self, profile: HostProfile) -> Self {
        self.hosts.insert(profile.id.clone(), profile);
        self
    }

    pub fn with_firmware(mut self, package: FirmwarePackage) -> Self {
        self.firmware.insert(package.id.clone(), package);
        self
    }

    /// Discovered hosts become standalone targets keyed by IP address unless
    /// a declared host already owns that address
    pub fn merge_discovered(&mut self, discovered: &[DiscoveredHost]) {
        for host in discovered {
            let declared = self
                .hosts
                .values()
                .any(|h| h.ip_address.as_deref() == Some(host.ip_address.as_str()));
            if declared || self.hosts.contains_key(&host.ip_address) {
                continue;
            }
            let mut profile = HostProfile::standalone(host.ip_address.clone());
            profile.hostname = host.hostname.clone();
            profile.ip_address = Some(host.ip_address.clone());
            self.hosts.insert(profile.id.clone(), profile);
        }
    }

    pub fn host(&self, host_id: &str) -> Option<&HostProfile> {
        self.hosts.get(host_id)
    }

    pub fn firmware(&self, package_id: &str) -> Option<&FirmwarePackage> {
        self.firmware.get(package_id)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}

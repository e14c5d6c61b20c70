//! Common test data and constants

use chrono::{DateTime, Utc};
use fleet_manager::inventory::{FirmwarePackage, HostProfile, Inventory, Readiness};

/// Get current timestamp for testing
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Common test host ids
pub mod hosts {
    pub const ESX_1: &str = "esx-01";
    pub const ESX_2: &str = "esx-02";
    pub const ESX_3: &str = "esx-03";
    pub const STANDALONE: &str = "bare-01";
}

/// Common test clusters
pub mod clusters {
    pub const PROD_A: &str = "prod-a";
}

/// Common test firmware packages
pub mod firmware {
    pub const BIOS: &str = "bios-2-19";
    pub const BIOS_URL: &str = "https://firmware.example/bios-2.19.1.exe";
    pub const IDRAC: &str = "idrac-7-10";
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn bios_package() -> FirmwarePackage {
    FirmwarePackage {
        id: firmware::BIOS.to_string(),
        component: "bios".to_string(),
        version: "2.19.1".to_string(),
        url: firmware::BIOS_URL.to_string(),
    }
}

/// Two clustered HA hosts and one standalone host, all ready
pub fn sample_inventory() -> Inventory {
    Inventory::new()
        .with_host(
            HostProfile::standalone(hosts::ESX_1)
                .in_cluster(clusters::PROD_A)
                .with_ha(true)
                .with_vms(12)
                .with_readiness(Readiness::Ready),
        )
        .with_host(
            HostProfile::standalone(hosts::ESX_2)
                .in_cluster(clusters::PROD_A)
                .with_ha(true)
                .with_vms(8)
                .with_readiness(Readiness::Ready),
        )
        .with_host(
            HostProfile::standalone(hosts::STANDALONE)
                .with_vms(2)
                .with_readiness(Readiness::Ready),
        )
        .with_firmware(bios_package())
}

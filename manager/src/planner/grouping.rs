// File: manager/src/planner/grouping.rs
//
// Hosts that share a cluster are updated as one group. Grouping is the
// transitive closure of the shared-cluster relation.
//
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::types::RiskLevel;
use crate::constants::planner as weights;
use crate::inventory::{HostProfile, Readiness};

/// Minimal union-find over host indices
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a != root_b {
            // keep the lower index as root so the result is order independent
            let (low, high) = (root_a.min(root_b), root_a.max(root_b));
            self.parent[high] = low;
        }
    }
}

/// Hosts of one group before batching
#[derive(Debug, Clone, PartialEq)]
pub struct HostCluster<'a> {
    pub hosts: Vec<&'a HostProfile>,
    pub cluster: Option<String>,
}

impl HostCluster<'_> {
    pub fn server_ids(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.id.clone()).collect()
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.hosts
            .iter()
            .map(|h| host_risk(h))
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    pub fn criticality_score(&self) -> f64 {
        let total: f64 = self.hosts.iter().map(|h| host_criticality(h)).sum();
        (total * 10.0).round() / 10.0
    }
}

/// Group hosts by cluster membership. `hosts` must already be deduplicated;
/// groups and their members come out sorted by host id.
pub fn group_hosts<'a>(hosts: &[&'a HostProfile]) -> Vec<HostCluster<'a>> {
    let mut sorted: Vec<&HostProfile> = hosts.to_vec();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut set = DisjointSet::new(sorted.len());
    let mut first_in_cluster: HashMap<&str, usize> = HashMap::new();
    for (index, host) in sorted.iter().enumerate() {
        if let Some(cluster) = host.cluster.as_deref() {
            match first_in_cluster.get(cluster) {
                Some(first) => set.union(*first, index),
                None => {
                    first_in_cluster.insert(cluster, index);
                }
            }
        }
    }

    let mut members: BTreeMap<usize, Vec<&HostProfile>> = BTreeMap::new();
    for index in 0..sorted.len() {
        let root = set.find(index);
        members.entry(root).or_default().push(sorted[index]);
    }

    members
        .into_values()
        .map(|hosts| {
            let clusters: BTreeSet<&str> = hosts.iter().filter_map(|h| h.cluster.as_deref()).collect();
            HostCluster {
                cluster: clusters.into_iter().next().map(str::to_string),
                hosts,
            }
        })
        .collect()
}

pub fn host_risk(host: &HostProfile) -> RiskLevel {
    if host.vm_count >= weights::HIGH_RISK_VM_COUNT || host.readiness == Some(Readiness::NotReady) {
        RiskLevel::High
    } else if host.vm_count >= weights::MEDIUM_RISK_VM_COUNT
        || host.ha_enabled
        || host.readiness == Some(Readiness::Degraded)
    {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Weighted sum favoring HA membership and VM count, minus a readiness penalty
pub fn host_criticality(host: &HostProfile) -> f64 {
    let ha = if host.ha_enabled { weights::HA_WEIGHT } else { 0.0 };
    let vms = (host.vm_count as f64 * weights::VM_WEIGHT).min(weights::VM_WEIGHT_CAP);
    let penalty = match host.readiness {
        Some(Readiness::NotReady) => weights::NOT_READY_PENALTY,
        Some(Readiness::Degraded) => weights::DEGRADED_PENALTY,
        _ => 0.0,
    };
    (ha + vms - penalty).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_members_share_a_group() {
        let a = HostProfile::standalone("a").in_cluster("prod");
        let b = HostProfile::standalone("b");
        let c = HostProfile::standalone("c").in_cluster("prod");
        let d = HostProfile::standalone("d").in_cluster("dev");

        let groups = group_hosts(&[&c, &b, &d, &a]);
        let ids: Vec<Vec<String>> = groups.iter().map(|g| g.server_ids()).collect();
        assert_eq!(
            ids,
            vec![
                vec!["a".to_string(), "c".to_string()],
                vec!["b".to_string()],
                vec!["d".to_string()],
            ]
        );
        assert_eq!(groups[0].cluster.as_deref(), Some("prod"));
        assert_eq!(groups[1].cluster, None);
    }

    #[test]
    fn risk_follows_vms_ha_and_readiness() {
        assert_eq!(host_risk(&HostProfile::standalone("h")), RiskLevel::Low);
        assert_eq!(host_risk(&HostProfile::standalone("h").with_vms(5)), RiskLevel::Medium);
        assert_eq!(host_risk(&HostProfile::standalone("h").with_ha(true)), RiskLevel::Medium);
        assert_eq!(host_risk(&HostProfile::standalone("h").with_vms(20)), RiskLevel::High);
        assert_eq!(
            host_risk(&HostProfile::standalone("h").with_readiness(Readiness::NotReady)),
            RiskLevel::High
        );
    }

    #[test]
    fn criticality_is_capped_and_penalized() {
        let big = HostProfile::standalone("h").with_ha(true).with_vms(100);
        assert_eq!(host_criticality(&big), 90.0);

        let degraded = HostProfile::standalone("h")
            .with_vms(10)
            .with_readiness(Readiness::Degraded);
        assert_eq!(host_criticality(&degraded), 10.0);

        let broken = HostProfile::standalone("h").with_readiness(Readiness::NotReady);
        assert_eq!(host_criticality(&broken), 0.0);
    }
}

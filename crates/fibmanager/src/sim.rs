//! In-process collaborators for running fibmanagerd without a controller.
//!
//! [`StaticTopology`] answers route, VPN-id and membership queries from the
//! `topology` section of the config file; [`LoggingFlowProgrammer`] logs
//! every flow request instead of pushing it to a switch.

use async_trait::async_trait;
use dashmap::DashMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use vpn_types::{DpnId, IpPrefix, RouteDistinguisher, TunnelStateEvent, VpnId, VrfEntry};

use crate::fib::{
    FibError, FlowProgrammer, FlowRequest, Result, RouteSource, VpnIdResolver, VpnMembership,
};

/// One VPN instance and its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnConfig {
    pub name: String,
    pub vpn_id: VpnId,
    #[serde(default)]
    pub rds: Vec<RouteDistinguisher>,
    #[serde(default)]
    pub dpns: Vec<DpnId>,
}

/// DPNs terminating a tunnel endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TepConfig {
    pub tep: IpAddr,
    pub dpns: Vec<DpnId>,
}

/// Seed data for [`StaticTopology`], plus the lifecycle events replayed at
/// startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub vpns: Vec<VpnConfig>,
    #[serde(default)]
    pub teps: Vec<TepConfig>,
    #[serde(default)]
    pub routes: Vec<VrfEntry>,
    #[serde(default)]
    pub tunnels: Vec<TunnelStateEvent>,
    #[serde(default)]
    pub operational_dpns: Vec<DpnId>,
}

impl TopologyConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut ids = BTreeSet::new();
        let mut rds = BTreeSet::new();
        for vpn in &self.vpns {
            if !ids.insert(vpn.vpn_id) {
                return Err(format!("duplicate vpn_id {} ({})", vpn.vpn_id, vpn.name));
            }
            for rd in &vpn.rds {
                if !rds.insert(*rd) {
                    return Err(format!("rd {} assigned to more than one VPN", rd));
                }
            }
        }

        for route in &self.routes {
            if !rds.contains(&route.rd) {
                return Err(format!(
                    "route {} {} uses rd not assigned to any VPN",
                    route.rd, route.prefix
                ));
            }
        }
        Ok(())
    }
}

/// Route source, VPN-id resolver and membership directory backed by memory.
#[derive(Debug, Default)]
pub struct StaticTopology {
    routes: DashMap<(RouteDistinguisher, IpPrefix), VrfEntry>,
    vpn_by_rd: DashMap<RouteDistinguisher, VpnId>,
    vpns: DashMap<VpnId, VpnConfig>,
    teps: DashMap<IpAddr, Vec<DpnId>>,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TopologyConfig) -> Self {
        let topology = Self::new();
        for vpn in &config.vpns {
            topology.add_vpn(vpn.clone());
        }
        for tep in &config.teps {
            topology.teps.insert(tep.tep, tep.dpns.clone());
        }
        for route in &config.routes {
            topology.upsert(route.clone());
        }
        topology
    }

    pub fn add_vpn(&self, vpn: VpnConfig) {
        for rd in &vpn.rds {
            self.vpn_by_rd.insert(*rd, vpn.vpn_id);
        }
        self.vpns.insert(vpn.vpn_id, vpn);
    }

    pub fn set_tep_owners(&self, tep: IpAddr, dpns: Vec<DpnId>) {
        self.teps.insert(tep, dpns);
    }

    /// Stores `entry`, returning the entry it replaced.
    pub fn upsert(&self, entry: VrfEntry) -> Option<VrfEntry> {
        self.routes.insert(entry.key(), entry)
    }

    pub fn withdraw(&self, rd: &RouteDistinguisher, prefix: &IpPrefix) -> Option<VrfEntry> {
        self.routes.remove(&(*rd, *prefix)).map(|(_, entry)| entry)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

#[async_trait]
impl RouteSource for StaticTopology {
    async fn vrf_entry(
        &self,
        rd: &RouteDistinguisher,
        prefix: &IpPrefix,
    ) -> Result<Option<VrfEntry>> {
        Ok(self.routes.get(&(*rd, *prefix)).map(|e| e.clone()))
    }

    async fn vrf_entries(&self, rd: &RouteDistinguisher) -> Result<Vec<VrfEntry>> {
        let sorted: BTreeMap<IpPrefix, VrfEntry> = self
            .routes
            .iter()
            .filter(|r| r.key().0 == *rd)
            .map(|r| (r.key().1, r.value().clone()))
            .collect();
        Ok(sorted.into_values().collect())
    }

    async fn route_distinguishers(&self) -> Result<Vec<RouteDistinguisher>> {
        let rds: BTreeSet<RouteDistinguisher> = self.routes.iter().map(|r| r.key().0).collect();
        Ok(rds.into_iter().collect())
    }
}

#[async_trait]
impl VpnIdResolver for StaticTopology {
    async fn resolve(&self, rd: &RouteDistinguisher) -> Result<VpnId> {
        self.vpn_by_rd
            .get(rd)
            .map(|id| *id)
            .ok_or(FibError::VpnIdUnresolved(*rd))
    }
}

#[async_trait]
impl VpnMembership for StaticTopology {
    async fn dpns_for_vpn(&self, vpn_id: VpnId) -> Result<Vec<DpnId>> {
        Ok(self
            .vpns
            .get(&vpn_id)
            .map(|vpn| vpn.dpns.clone())
            .unwrap_or_default())
    }

    async fn vpns_for_dpn(&self, dpn: DpnId) -> Result<Vec<VpnId>> {
        let mut vpns: Vec<VpnId> = self
            .vpns
            .iter()
            .filter(|vpn| vpn.dpns.contains(&dpn))
            .map(|vpn| vpn.vpn_id)
            .collect();
        vpns.sort();
        Ok(vpns)
    }

    async fn rds_for_vpn(&self, vpn_id: VpnId) -> Result<Vec<RouteDistinguisher>> {
        Ok(self
            .vpns
            .get(&vpn_id)
            .map(|vpn| vpn.rds.clone())
            .unwrap_or_default())
    }

    async fn dpns_for_tep(&self, tep: IpAddr) -> Result<Vec<DpnId>> {
        Ok(self.teps.get(&tep).map(|d| d.clone()).unwrap_or_default())
    }
}

/// Flow programmer that only logs.
#[derive(Debug, Default)]
pub struct LoggingFlowProgrammer {
    installs: AtomicU64,
    removals: AtomicU64,
}

impl LoggingFlowProgrammer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    pub fn removals(&self) -> u64 {
        self.removals.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FlowProgrammer for LoggingFlowProgrammer {
    async fn install(&self, request: &FlowRequest) -> Result<()> {
        self.installs.fetch_add(1, Ordering::Relaxed);
        info!("flow install: {}", request);
        Ok(())
    }

    async fn remove(&self, request: &FlowRequest) -> Result<()> {
        self.removals.fetch_add(1, Ordering::Relaxed);
        info!("flow remove: {}", request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vpn_types::RouteOrigin;

    const TOPOLOGY: &str = r#"
vpns:
  - name: v1
    vpn_id: 1
    rds: ["65000:100"]
    dpns: [1, 2]
teps:
  - tep: 192.0.2.2
    dpns: [2]
routes:
  - rd: "65000:100"
    prefix: 10.1.2.0/24
    origin: remote
    paths:
      - nexthop: 192.0.2.2
  - rd: "65000:100"
    prefix: 10.1.1.0/24
    origin: local
    paths:
      - nexthop: 192.0.2.2
        label: 100
"#;

    fn topology() -> StaticTopology {
        let config: TopologyConfig = serde_yaml::from_str(TOPOLOGY).unwrap();
        assert!(config.validate().is_ok());
        StaticTopology::from_config(&config)
    }

    #[tokio::test]
    async fn test_routes_listed_by_prefix() {
        let topology = topology();
        let rd: RouteDistinguisher = "65000:100".parse().unwrap();

        let entries = topology.vrf_entries(&rd).await.unwrap();
        let prefixes: Vec<String> = entries.iter().map(|e| e.prefix.to_string()).collect();
        assert_eq!(prefixes, vec!["10.1.1.0/24", "10.1.2.0/24"]);
        assert_eq!(entries[0].origin, RouteOrigin::Local);
        assert_eq!(entries[0].paths[0].label, Some(100));
    }

    #[tokio::test]
    async fn test_membership_lookups() {
        let topology = topology();
        let rd: RouteDistinguisher = "65000:100".parse().unwrap();

        assert_eq!(topology.resolve(&rd).await.unwrap(), VpnId(1));
        assert_eq!(topology.vpns_for_dpn(DpnId(2)).await.unwrap(), vec![VpnId(1)]);
        assert!(topology.vpns_for_dpn(DpnId(9)).await.unwrap().is_empty());
        assert_eq!(
            topology.dpns_for_tep("192.0.2.2".parse().unwrap()).await.unwrap(),
            vec![DpnId(2)]
        );
        assert!(topology
            .resolve(&"65000:999".parse().unwrap())
            .await
            .is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_rd() {
        let mut config: TopologyConfig = serde_yaml::from_str(TOPOLOGY).unwrap();
        config.vpns[0].rds.clear();
        assert!(config.validate().is_err());
    }
}

//! Collaborator interfaces consumed by the FIB manager.
//!
//! Everything outside route reconciliation (the route store, VPN
//! configuration, the flow encoder) is reached through these traits so the
//! core can be driven by real services or by test doubles.

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use vpn_types::{DpnId, IpPrefix, RouteDistinguisher, VpnId, VrfEntry};

use super::error::Result;

/// Read access to the learned VRF tables.
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// Returns the current entry for (rd, prefix), if any.
    async fn vrf_entry(&self, rd: &RouteDistinguisher, prefix: &IpPrefix)
        -> Result<Option<VrfEntry>>;

    /// Returns every entry of one VRF table.
    async fn vrf_entries(&self, rd: &RouteDistinguisher) -> Result<Vec<VrfEntry>>;

    /// Returns every known VRF table key.
    async fn route_distinguishers(&self) -> Result<Vec<RouteDistinguisher>>;
}

/// Maps a route distinguisher to its VPN instance.
#[async_trait]
pub trait VpnIdResolver: Send + Sync {
    /// Fails with `FibError::VpnIdUnresolved` for an unknown rd.
    async fn resolve(&self, rd: &RouteDistinguisher) -> Result<VpnId>;
}

/// VPN membership and tunnel endpoint directory.
#[async_trait]
pub trait VpnMembership: Send + Sync {
    /// DPNs currently participating in the VPN.
    async fn dpns_for_vpn(&self, vpn_id: VpnId) -> Result<Vec<DpnId>>;

    /// VPNs a DPN participates in.
    async fn vpns_for_dpn(&self, dpn: DpnId) -> Result<Vec<VpnId>>;

    /// VRF tables (route distinguishers) of a VPN.
    async fn rds_for_vpn(&self, vpn_id: VpnId) -> Result<Vec<RouteDistinguisher>>;

    /// DPNs that terminate the given tunnel endpoint. Empty for a TEP
    /// outside this fabric.
    async fn dpns_for_tep(&self, tep: IpAddr) -> Result<Vec<DpnId>>;
}

/// One forwarding action on one DPN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    pub dpn: DpnId,
    pub vpn_id: VpnId,
    pub rd: RouteDistinguisher,
    /// The route being realized.
    pub entry: VrfEntry,
    /// Tunnel endpoint the flow forwards to. For extra routes this is the
    /// endpoint resolved through the host route, not the entry's own
    /// next-hop.
    pub nexthop: IpAddr,
}

impl FlowRequest {
    pub fn new(dpn: DpnId, vpn_id: VpnId, entry: &VrfEntry, nexthop: IpAddr) -> Self {
        Self {
            dpn,
            vpn_id,
            rd: entry.rd,
            entry: entry.clone(),
            nexthop,
        }
    }

    pub fn prefix(&self) -> IpPrefix {
        self.entry.prefix
    }
}

impl fmt::Display for FlowRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vpn {} {} {} via {}",
            self.dpn, self.vpn_id, self.rd, self.entry.prefix, self.nexthop
        )
    }
}

/// Programs forwarding actions on DPNs.
///
/// Both operations are idempotent on the device side.
#[async_trait]
pub trait FlowProgrammer: Send + Sync {
    async fn install(&self, request: &FlowRequest) -> Result<()>;

    async fn remove(&self, request: &FlowRequest) -> Result<()>;
}

/// The full set of collaborators the FIB manager needs.
#[derive(Clone)]
pub struct FibCallbacks {
    pub routes: Arc<dyn RouteSource>,
    pub vpn_ids: Arc<dyn VpnIdResolver>,
    pub membership: Arc<dyn VpnMembership>,
    pub flows: Arc<dyn FlowProgrammer>,
}

impl fmt::Debug for FibCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FibCallbacks").finish_non_exhaustive()
    }
}

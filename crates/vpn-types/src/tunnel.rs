//! Device, VPN and tunnel identifiers.

use crate::{IpPrefix, ParseError, RouteDistinguisher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Forwarding node (DPN) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DpnId(pub u64);

impl DpnId {
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DpnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dpn-{}", self.0)
    }
}

impl From<u64> for DpnId {
    fn from(id: u64) -> Self {
        DpnId(id)
    }
}

/// Numeric VPN instance identifier, resolved from a route distinguisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VpnId(pub u32);

impl VpnId {
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VpnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VpnId {
    fn from(id: u32) -> Self {
        VpnId(id)
    }
}

/// A tunnel path from a source DPN towards a destination tunnel endpoint.
///
/// This is the key under which routes wait for their tunnel.
///
/// # Examples
///
/// ```
/// use vpn_types::{DpnId, TunnelEndpointPair};
///
/// let pair = TunnelEndpointPair::new(DpnId(1), "192.0.2.2".parse().unwrap());
/// assert_eq!(pair.to_string(), "dpn-1->192.0.2.2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TunnelEndpointPair {
    pub src_dpn: DpnId,
    pub dst_tep: IpAddr,
}

impl TunnelEndpointPair {
    pub const fn new(src_dpn: DpnId, dst_tep: IpAddr) -> Self {
        Self { src_dpn, dst_tep }
    }
}

impl fmt::Display for TunnelEndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src_dpn, self.dst_tep)
    }
}

/// Operational state of a tunnel as reported by the tunnel-state source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelOperState {
    Up,
    Down,
}

impl TunnelOperState {
    pub const fn is_up(&self) -> bool {
        matches!(self, TunnelOperState::Up)
    }
}

impl fmt::Display for TunnelOperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelOperState::Up => write!(f, "up"),
            TunnelOperState::Down => write!(f, "down"),
        }
    }
}

impl FromStr for TunnelOperState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(TunnelOperState::Up),
            "down" | "unknown" => Ok(TunnelOperState::Down),
            _ => Err(ParseError::InvalidTunnelState(s.to_string())),
        }
    }
}

/// Tunnel add/update notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStateEvent {
    pub src_dpn: DpnId,
    pub src_tep: IpAddr,
    pub dst_dpn: DpnId,
    pub dst_tep: IpAddr,
    pub state: TunnelOperState,
}

impl TunnelStateEvent {
    /// Returns the pending-store key for the source side of the tunnel.
    pub const fn pair(&self) -> TunnelEndpointPair {
        TunnelEndpointPair::new(self.src_dpn, self.dst_tep)
    }
}

impl fmt::Display for TunnelStateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}({}) {}",
            self.src_dpn, self.src_tep, self.dst_dpn, self.dst_tep, self.state
        )
    }
}

/// A route parked under a tunnel pair until that tunnel is operational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingFibEntry {
    pub rd: RouteDistinguisher,
    pub prefix: IpPrefix,
}

impl PendingFibEntry {
    pub const fn new(rd: RouteDistinguisher, prefix: IpPrefix) -> Self {
        Self { rd, prefix }
    }
}

impl fmt::Display for PendingFibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.rd, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_pair_uses_source_dpn_and_destination_tep() {
        let event = TunnelStateEvent {
            src_dpn: DpnId(1),
            src_tep: "192.0.2.1".parse().unwrap(),
            dst_dpn: DpnId(2),
            dst_tep: "192.0.2.2".parse().unwrap(),
            state: TunnelOperState::Up,
        };

        assert_eq!(
            event.pair(),
            TunnelEndpointPair::new(DpnId(1), "192.0.2.2".parse().unwrap())
        );
        assert_eq!(
            event.to_string(),
            "dpn-1(192.0.2.1) -> dpn-2(192.0.2.2) up"
        );
    }

    #[test]
    fn test_oper_state_parse() {
        assert!("UP".parse::<TunnelOperState>().unwrap().is_up());
        assert!(!"unknown".parse::<TunnelOperState>().unwrap().is_up());
        assert!("flapping".parse::<TunnelOperState>().is_err());
    }

    #[test]
    fn test_pending_entry_display() {
        let entry = PendingFibEntry::new(
            "65000:100".parse().unwrap(),
            "10.1.1.0/24".parse().unwrap(),
        );
        assert_eq!(entry.to_string(), "65000:100 10.1.1.0/24");
    }
}

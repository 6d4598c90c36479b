//! Notifications accepted by the daemon.

use std::fmt;
use vpn_types::{DpnId, IpPrefix, RouteDistinguisher, TunnelEndpointPair, TunnelStateEvent, VrfEntry};

/// A notification from a route, tunnel or device-lifecycle source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FibEvent {
    VrfEntryAdded(VrfEntry),
    VrfEntryUpdated { old: VrfEntry, new: VrfEntry },
    VrfEntryRemoved(VrfEntry),
    TunnelState(TunnelStateEvent),
    DpnOperational(DpnId),
}

/// Events with equal keys are processed one at a time, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Route(RouteDistinguisher, IpPrefix),
    Tunnel(TunnelEndpointPair),
    Dpn(DpnId),
}

impl FibEvent {
    pub fn key(&self) -> EventKey {
        match self {
            FibEvent::VrfEntryAdded(entry) | FibEvent::VrfEntryRemoved(entry) => {
                EventKey::Route(entry.rd, entry.prefix)
            }
            FibEvent::VrfEntryUpdated { new, .. } => EventKey::Route(new.rd, new.prefix),
            FibEvent::TunnelState(event) => EventKey::Tunnel(event.pair()),
            FibEvent::DpnOperational(dpn) => EventKey::Dpn(*dpn),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FibEvent::VrfEntryAdded(_) => "vrf_entry_added",
            FibEvent::VrfEntryUpdated { .. } => "vrf_entry_updated",
            FibEvent::VrfEntryRemoved(_) => "vrf_entry_removed",
            FibEvent::TunnelState(_) => "tunnel_state",
            FibEvent::DpnOperational(_) => "dpn_operational",
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Route(rd, prefix) => write!(f, "route {} {}", rd, prefix),
            EventKey::Tunnel(pair) => write!(f, "tunnel {}", pair),
            EventKey::Dpn(dpn) => write!(f, "{}", dpn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpn_types::{RouteOrigin, TunnelOperState};

    fn entry(nexthop: &str) -> VrfEntry {
        VrfEntry::new(
            "65000:100".parse().unwrap(),
            "10.1.1.0/24".parse().unwrap(),
            RouteOrigin::Remote,
        )
        .with_nexthop(nexthop.parse().unwrap())
    }

    #[test]
    fn test_route_events_share_a_key() {
        let added = FibEvent::VrfEntryAdded(entry("192.0.2.2"));
        let updated = FibEvent::VrfEntryUpdated {
            old: entry("192.0.2.2"),
            new: entry("192.0.2.3"),
        };
        let removed = FibEvent::VrfEntryRemoved(entry("192.0.2.3"));

        assert_eq!(added.key(), updated.key());
        assert_eq!(added.key(), removed.key());
        assert_eq!(added.key().to_string(), "route 65000:100 10.1.1.0/24");
    }

    #[test]
    fn test_tunnel_key_is_source_side_pair() {
        let event = FibEvent::TunnelState(TunnelStateEvent {
            src_dpn: DpnId(1),
            src_tep: "192.0.2.1".parse().unwrap(),
            dst_dpn: DpnId(2),
            dst_tep: "192.0.2.2".parse().unwrap(),
            state: TunnelOperState::Up,
        });

        assert_eq!(
            event.key(),
            EventKey::Tunnel(TunnelEndpointPair::new(DpnId(1), "192.0.2.2".parse().unwrap()))
        );
        assert_eq!(event.kind(), "tunnel_state");
    }
}

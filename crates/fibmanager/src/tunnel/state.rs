//! Tunnel operational state and per-tunnel installed-route bookkeeping.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use vpn_types::{
    DpnId, IpPrefix, PendingFibEntry, RouteDistinguisher, TunnelEndpointPair, TunnelOperState,
};

/// What happens to routes already installed over a tunnel that goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelDownPolicy {
    /// Installed flows are left in place.
    #[default]
    Retain,
    /// Installed flows are removed from the source DPN and the routes are
    /// parked until the tunnel comes back.
    Requeue,
}

impl fmt::Display for TunnelDownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelDownPolicy::Retain => write!(f, "retain"),
            TunnelDownPolicy::Requeue => write!(f, "requeue"),
        }
    }
}

impl FromStr for TunnelDownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retain" => Ok(TunnelDownPolicy::Retain),
            "requeue" => Ok(TunnelDownPolicy::Requeue),
            _ => Err(format!("unknown tunnel down policy: {}", s)),
        }
    }
}

/// Last reported state per tunnel. Unknown tunnels are down.
#[derive(Debug, Default)]
pub struct TunnelStateTable {
    states: DashMap<TunnelEndpointPair, TunnelOperState>,
}

impl TunnelStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` and returns the previous one.
    pub fn set(&self, pair: TunnelEndpointPair, state: TunnelOperState) -> TunnelOperState {
        self.states
            .insert(pair, state)
            .unwrap_or(TunnelOperState::Down)
    }

    pub fn state(&self, pair: &TunnelEndpointPair) -> TunnelOperState {
        self.states
            .get(pair)
            .map(|s| *s)
            .unwrap_or(TunnelOperState::Down)
    }

    pub fn is_up(&self, pair: &TunnelEndpointPair) -> bool {
        self.state(pair).is_up()
    }

    /// Number of tunnels currently up.
    pub fn up_count(&self) -> usize {
        self.states.iter().filter(|s| s.value().is_up()).count()
    }
}

/// Routes installed on a source DPN over a given tunnel.
#[derive(Debug, Default)]
pub struct InstalledIndex {
    routes: DashMap<TunnelEndpointPair, BTreeSet<PendingFibEntry>>,
}

impl InstalledIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, pair: TunnelEndpointPair, rd: RouteDistinguisher, prefix: IpPrefix) {
        self.routes
            .entry(pair)
            .or_default()
            .insert(PendingFibEntry::new(rd, prefix));
    }

    /// Forgets one route; returns true if it was recorded.
    pub fn unmark(
        &self,
        pair: &TunnelEndpointPair,
        rd: &RouteDistinguisher,
        prefix: &IpPrefix,
    ) -> bool {
        let entry = PendingFibEntry::new(*rd, *prefix);
        let mut removed = false;
        if let Some(mut set) = self.routes.get_mut(pair) {
            removed = set.remove(&entry);
        }
        self.routes.remove_if(pair, |_, set| set.is_empty());
        removed
    }

    pub fn contains(
        &self,
        pair: &TunnelEndpointPair,
        rd: &RouteDistinguisher,
        prefix: &IpPrefix,
    ) -> bool {
        self.routes
            .get(pair)
            .map(|set| set.contains(&PendingFibEntry::new(*rd, *prefix)))
            .unwrap_or(false)
    }

    /// Returns every pair over which (rd, prefix) is installed.
    pub fn pairs_for(&self, rd: &RouteDistinguisher, prefix: &IpPrefix) -> Vec<TunnelEndpointPair> {
        let entry = PendingFibEntry::new(*rd, *prefix);
        let mut pairs: Vec<TunnelEndpointPair> = self
            .routes
            .iter()
            .filter(|r| r.value().contains(&entry))
            .map(|r| *r.key())
            .collect();
        pairs.sort();
        pairs
    }

    /// Removes and returns everything installed over `pair`.
    pub fn take(&self, pair: &TunnelEndpointPair) -> Vec<PendingFibEntry> {
        self.routes
            .remove(pair)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Forgets and returns everything installed on `dpn`.
    pub fn forget_dpn(&self, dpn: DpnId) -> Vec<(TunnelEndpointPair, PendingFibEntry)> {
        let mut forgotten = Vec::new();
        self.routes.retain(|pair, set| {
            if pair.src_dpn != dpn {
                return true;
            }
            forgotten.extend(set.iter().map(|entry| (*pair, *entry)));
            false
        });
        forgotten.sort();
        forgotten
    }

    pub fn len(&self) -> usize {
        self.routes.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(dpn: u64) -> TunnelEndpointPair {
        TunnelEndpointPair::new(DpnId(dpn), "192.0.2.2".parse().unwrap())
    }

    #[test]
    fn test_unknown_tunnel_is_down() {
        let table = TunnelStateTable::new();
        assert!(!table.is_up(&pair(1)));
        assert_eq!(table.set(pair(1), TunnelOperState::Up), TunnelOperState::Down);
        assert!(table.is_up(&pair(1)));
        assert_eq!(table.set(pair(1), TunnelOperState::Down), TunnelOperState::Up);
        assert_eq!(table.up_count(), 0);
    }

    #[test]
    fn test_installed_index_mark_unmark() {
        let index = InstalledIndex::new();
        let rd: RouteDistinguisher = "65000:100".parse().unwrap();
        let prefix: IpPrefix = "10.1.1.0/24".parse().unwrap();

        index.mark(pair(1), rd, prefix);
        assert!(index.contains(&pair(1), &rd, &prefix));
        assert!(index.unmark(&pair(1), &rd, &prefix));
        assert!(!index.unmark(&pair(1), &rd, &prefix));
        assert!(index.is_empty());
    }

    #[test]
    fn test_forget_dpn() {
        let index = InstalledIndex::new();
        let rd: RouteDistinguisher = "65000:100".parse().unwrap();
        index.mark(pair(1), rd, "10.1.1.0/24".parse().unwrap());
        index.mark(pair(1), rd, "10.1.2.0/24".parse().unwrap());
        index.mark(pair(2), rd, "10.1.1.0/24".parse().unwrap());

        let forgotten = index.forget_dpn(DpnId(1));
        assert_eq!(forgotten.len(), 2);
        assert!(forgotten.iter().all(|(p, _)| *p == pair(1)));
        assert_eq!(forgotten[0].1.prefix, "10.1.1.0/24".parse::<IpPrefix>().unwrap());
        assert_eq!(index.len(), 1);
        assert_eq!(index.take(&pair(2)).len(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Requeue".parse::<TunnelDownPolicy>().unwrap(), TunnelDownPolicy::Requeue);
        assert_eq!(TunnelDownPolicy::default(), TunnelDownPolicy::Retain);
        assert!("evict".parse::<TunnelDownPolicy>().is_err());
    }
}

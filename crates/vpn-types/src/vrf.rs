//! VRF entry types.

use crate::{IpPrefix, ParseError, RouteDistinguisher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A VRF table is identified by its route distinguisher.
pub type VrfTableKey = RouteDistinguisher;

/// Where a route was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteOrigin {
    /// Originated by a VM/port attached to a DPN of this fabric.
    Local,
    /// Learned from a remote peer (e.g. BGP).
    Remote,
    /// Extra route whose next-hop is an address inside the VRF.
    Static,
}

impl fmt::Display for RouteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteOrigin::Local => write!(f, "local"),
            RouteOrigin::Remote => write!(f, "remote"),
            RouteOrigin::Static => write!(f, "static"),
        }
    }
}

impl FromStr for RouteOrigin {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "l" => Ok(RouteOrigin::Local),
            "remote" | "bgp" | "b" => Ok(RouteOrigin::Remote),
            "static" | "s" => Ok(RouteOrigin::Static),
            _ => Err(ParseError::InvalidRouteOrigin(s.to_string())),
        }
    }
}

/// One next-hop descriptor of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutePath {
    /// Next-hop IP. For local and remote routes this is a tunnel endpoint.
    pub nexthop: IpAddr,
    /// MPLS-style label carried towards the next-hop, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<u32>,
}

impl RoutePath {
    pub fn new(nexthop: IpAddr) -> Self {
        Self {
            nexthop,
            label: None,
        }
    }

    pub fn with_label(mut self, label: u32) -> Self {
        self.label = Some(label);
        self
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label {
            Some(label) => write!(f, "{} label {}", self.nexthop, label),
            None => write!(f, "{}", self.nexthop),
        }
    }
}

/// A learned route in a VRF table.
///
/// Entries are immutable once observed: an update is modelled as the old
/// entry being replaced by a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfEntry {
    pub rd: RouteDistinguisher,
    pub prefix: IpPrefix,
    pub origin: RouteOrigin,
    pub paths: Vec<RoutePath>,
}

impl VrfEntry {
    /// Creates an entry with no paths yet.
    pub fn new(rd: RouteDistinguisher, prefix: IpPrefix, origin: RouteOrigin) -> Self {
        Self {
            rd,
            prefix,
            origin,
            paths: Vec::new(),
        }
    }

    /// Adds a next-hop path (builder pattern).
    pub fn with_path(mut self, path: RoutePath) -> Self {
        self.paths.push(path);
        self
    }

    /// Adds a next-hop without a label (builder pattern).
    pub fn with_nexthop(self, nexthop: IpAddr) -> Self {
        self.with_path(RoutePath::new(nexthop))
    }

    /// Returns the (rd, prefix) pair identifying this entry.
    pub fn key(&self) -> (RouteDistinguisher, IpPrefix) {
        (self.rd, self.prefix)
    }

    /// Returns the distinct next-hop addresses in path order.
    pub fn nexthops(&self) -> Vec<IpAddr> {
        let mut seen = BTreeSet::new();
        self.paths
            .iter()
            .map(|p| p.nexthop)
            .filter(|nh| seen.insert(*nh))
            .collect()
    }

    /// Returns true if the entry has no usable next-hop.
    pub fn is_unresolved(&self) -> bool {
        self.paths.is_empty()
    }

    /// Compares only the attributes that affect forwarding.
    ///
    /// Path order is irrelevant; an update for which this returns true is a
    /// no-op for the data plane.
    pub fn forwarding_eq(&self, other: &VrfEntry) -> bool {
        let mine: BTreeSet<&RoutePath> = self.paths.iter().collect();
        let theirs: BTreeSet<&RoutePath> = other.paths.iter().collect();
        self.rd == other.rd
            && self.prefix == other.prefix
            && self.origin == other.origin
            && mine == theirs
    }
}

impl fmt::Display for VrfEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rd {} prefix {} origin {} nexthops [", self.rd, self.prefix, self.origin)?;
        for (i, path) in self.paths.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", path)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rd() -> RouteDistinguisher {
        "65000:100".parse().unwrap()
    }

    fn prefix() -> IpPrefix {
        "10.1.1.0/24".parse().unwrap()
    }

    #[test]
    fn test_route_origin_parse() {
        assert_eq!("local".parse::<RouteOrigin>().unwrap(), RouteOrigin::Local);
        assert_eq!("BGP".parse::<RouteOrigin>().unwrap(), RouteOrigin::Remote);
        assert_eq!("s".parse::<RouteOrigin>().unwrap(), RouteOrigin::Static);
        assert!("connected".parse::<RouteOrigin>().is_err());
    }

    #[test]
    fn test_nexthops_are_deduplicated() {
        let entry = VrfEntry::new(rd(), prefix(), RouteOrigin::Remote)
            .with_path(RoutePath::new("192.0.2.2".parse().unwrap()).with_label(100))
            .with_path(RoutePath::new("192.0.2.2".parse().unwrap()).with_label(200))
            .with_nexthop("192.0.2.3".parse().unwrap());

        assert_eq!(
            entry.nexthops(),
            vec![
                "192.0.2.2".parse::<IpAddr>().unwrap(),
                "192.0.2.3".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_forwarding_eq_ignores_path_order() {
        let a = VrfEntry::new(rd(), prefix(), RouteOrigin::Remote)
            .with_nexthop("192.0.2.2".parse().unwrap())
            .with_nexthop("192.0.2.3".parse().unwrap());
        let b = VrfEntry::new(rd(), prefix(), RouteOrigin::Remote)
            .with_nexthop("192.0.2.3".parse().unwrap())
            .with_nexthop("192.0.2.2".parse().unwrap());
        assert!(a.forwarding_eq(&b));
    }

    #[test]
    fn test_forwarding_eq_detects_label_change() {
        let a = VrfEntry::new(rd(), prefix(), RouteOrigin::Remote)
            .with_path(RoutePath::new("192.0.2.2".parse().unwrap()).with_label(100));
        let b = VrfEntry::new(rd(), prefix(), RouteOrigin::Remote)
            .with_path(RoutePath::new("192.0.2.2".parse().unwrap()).with_label(101));
        assert!(!a.forwarding_eq(&b));
    }

    #[test]
    fn test_display() {
        let entry = VrfEntry::new(rd(), prefix(), RouteOrigin::Remote)
            .with_path(RoutePath::new("192.0.2.2".parse().unwrap()).with_label(100));
        assert_eq!(
            entry.to_string(),
            "rd 65000:100 prefix 10.1.1.0/24 origin remote nexthops [192.0.2.2 label 100]"
        );
    }
}

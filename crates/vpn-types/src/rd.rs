//! Route distinguisher type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Administrator subfield of a route distinguisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RdAdministrator {
    /// Autonomous system number (type 0 / type 2).
    Asn(u32),
    /// IPv4 address (type 1).
    Ip(Ipv4Addr),
}

impl fmt::Display for RdAdministrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdAdministrator::Asn(asn) => write!(f, "{}", asn),
            RdAdministrator::Ip(ip) => write!(f, "{}", ip),
        }
    }
}

/// Route distinguisher identifying a VRF table (e.g. `65000:100`).
///
/// Many VRF entries share one route distinguisher; it is also the key used
/// to resolve the numeric VPN id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteDistinguisher {
    administrator: RdAdministrator,
    assigned: u32,
}

impl RouteDistinguisher {
    /// Creates an ASN-based route distinguisher.
    pub const fn asn(asn: u32, assigned: u32) -> Self {
        Self {
            administrator: RdAdministrator::Asn(asn),
            assigned,
        }
    }

    /// Creates an IPv4-based route distinguisher.
    pub const fn ip(ip: Ipv4Addr, assigned: u32) -> Self {
        Self {
            administrator: RdAdministrator::Ip(ip),
            assigned,
        }
    }

    pub const fn administrator(&self) -> RdAdministrator {
        self.administrator
    }

    pub const fn assigned(&self) -> u32 {
        self.assigned
    }
}

impl fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.administrator, self.assigned)
    }
}

impl FromStr for RouteDistinguisher {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidRouteDistinguisher(s.to_string());

        let (admin_str, assigned_str) = s.rsplit_once(':').ok_or_else(invalid)?;
        let assigned: u32 = assigned_str.parse().map_err(|_| invalid())?;

        let administrator = if admin_str.contains('.') {
            RdAdministrator::Ip(admin_str.parse().map_err(|_| invalid())?)
        } else {
            RdAdministrator::Asn(admin_str.parse().map_err(|_| invalid())?)
        };

        Ok(Self {
            administrator,
            assigned,
        })
    }
}

impl TryFrom<String> for RouteDistinguisher {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RouteDistinguisher> for String {
    fn from(rd: RouteDistinguisher) -> Self {
        rd.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_asn_rd() {
        let rd: RouteDistinguisher = "65000:100".parse().unwrap();
        assert_eq!(rd, RouteDistinguisher::asn(65000, 100));
        assert_eq!(rd.to_string(), "65000:100");
    }

    #[test]
    fn test_parse_ip_rd() {
        let rd: RouteDistinguisher = "192.0.2.1:7".parse().unwrap();
        assert_eq!(
            rd.administrator(),
            RdAdministrator::Ip(Ipv4Addr::new(192, 0, 2, 1))
        );
        assert_eq!(rd.assigned(), 7);
        assert_eq!(rd.to_string(), "192.0.2.1:7");
    }

    #[test]
    fn test_parse_invalid_rd() {
        assert!("65000".parse::<RouteDistinguisher>().is_err());
        assert!("abc:1".parse::<RouteDistinguisher>().is_err());
        assert!("65000:x".parse::<RouteDistinguisher>().is_err());
        assert!("300.0.0.1:1".parse::<RouteDistinguisher>().is_err());
    }
}

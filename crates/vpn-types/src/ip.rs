//! VRF entry prefixes.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Destination of a VRF entry, `10.1.1.0/24` or `2001:db8::/32`.
///
/// Host bits are kept as given so the text form matches what the route
/// source publishes. Ordering is family, then address, then length; FIB
/// listings rely on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddr,
    prefix_len: u8,
}

impl IpPrefix {
    /// Fails if `prefix_len` is longer than the address family allows.
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let max = max_len_for(&address);
        if prefix_len > max {
            return Err(ParseError::InvalidIpPrefix(format!(
                "{}/{}: length above {}",
                address, prefix_len, max
            )));
        }
        Ok(IpPrefix {
            address,
            prefix_len,
        })
    }

    /// The /32 or /128 route for `address`. Extra routes resolve their
    /// next-hop through this prefix.
    pub fn host(address: IpAddr) -> Self {
        IpPrefix {
            address,
            prefix_len: max_len_for(&address),
        }
    }

    pub const fn address(&self) -> IpAddr {
        self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn is_host_route(&self) -> bool {
        self.prefix_len == max_len_for(&self.address)
    }
}

fn max_len_for(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((addr, len)) = s.rsplit_once('/') else {
            return Err(ParseError::InvalidIpPrefix(s.to_string()));
        };
        let address = addr
            .parse::<IpAddr>()
            .map_err(|_| ParseError::InvalidIpAddress(addr.to_string()))?;
        let Ok(prefix_len) = len.parse::<u8>() else {
            return Err(ParseError::InvalidIpPrefix(s.to_string()));
        };
        IpPrefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> Self {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_keeps_host_bits() {
        let prefix: IpPrefix = "10.1.1.7/24".parse().unwrap();
        assert_eq!(prefix.address(), "10.1.1.7".parse::<IpAddr>().unwrap());
        assert_eq!(prefix.prefix_len(), 24);
        assert_eq!(prefix.to_string(), "10.1.1.7/24");

        let v6: IpPrefix = "2001:db8::/32".parse().unwrap();
        assert_eq!(v6.prefix_len(), 32);
    }

    #[test]
    fn test_ip_prefix_rejects_garbage() {
        assert!("10.1.1.0".parse::<IpPrefix>().is_err());
        assert!("10.1.1.0/abc".parse::<IpPrefix>().is_err());
        assert_eq!(
            "not-an-ip/24".parse::<IpPrefix>(),
            Err(ParseError::InvalidIpAddress("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_length_checked_per_family() {
        assert!("10.0.0.0/33".parse::<IpPrefix>().is_err());
        assert!("2001:db8::/33".parse::<IpPrefix>().is_ok());
        assert!("2001:db8::/129".parse::<IpPrefix>().is_err());
    }

    #[test]
    fn test_host_route() {
        let host = IpPrefix::host("192.0.2.10".parse().unwrap());
        assert_eq!(host.to_string(), "192.0.2.10/32");
        assert!(host.is_host_route());

        let host_v6 = IpPrefix::host("2001:db8::1".parse().unwrap());
        assert_eq!(host_v6.prefix_len(), 128);

        let network: IpPrefix = "10.0.0.0/24".parse().unwrap();
        assert!(!network.is_host_route());
    }

    #[test]
    fn test_ordering_is_stable() {
        let mut prefixes: Vec<IpPrefix> = ["10.2.0.0/16", "10.1.1.0/24", "10.1.1.0/16"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        prefixes.sort();

        let rendered: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["10.1.1.0/16", "10.1.1.0/24", "10.2.0.0/16"]);
    }

    #[test]
    fn test_serde_uses_cidr_string() {
        let prefix: IpPrefix = "10.1.1.0/24".parse().unwrap();
        let json = serde_json::to_string(&prefix).unwrap();
        assert_eq!(json, "\"10.1.1.0/24\"");

        let back: IpPrefix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prefix);
    }
}

//! Common L3VPN types for FIB reconciliation.
//!
//! This crate provides type-safe representations of the primitives shared by
//! the FIB manager and its collaborators:
//!
//! - [`RouteDistinguisher`]: VRF table identifier (`ASN:NN` or `IP:NN`)
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`VrfEntry`]: a learned route with its next-hop paths and origin
//! - [`DpnId`] / [`VpnId`]: forwarding node and VPN instance identifiers
//! - [`TunnelEndpointPair`]: the tunnel a remote route needs to be realized
//! - [`PendingFibEntry`]: a route parked until its tunnel comes up

mod ip;
mod rd;
mod tunnel;
mod vrf;

pub use ip::IpPrefix;
pub use rd::{RdAdministrator, RouteDistinguisher};
pub use tunnel::{
    DpnId, PendingFibEntry, TunnelEndpointPair, TunnelOperState, TunnelStateEvent, VpnId,
};
pub use vrf::{RouteOrigin, RoutePath, VrfEntry, VrfTableKey};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid route distinguisher: {0}")]
    InvalidRouteDistinguisher(String),

    #[error("invalid route origin: {0}")]
    InvalidRouteOrigin(String),

    #[error("invalid tunnel state: {0}")]
    InvalidTunnelState(String),
}

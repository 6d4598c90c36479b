//! Route handler chain.
//!
//! Every route change runs through an ordered list of [`RouteHandler`]s.
//! The built-in handlers are:
//!
//! - [`LocalRouteHandler`]: local routes on the DPN owning the next-hop TEP
//! - [`RemoteRouteHandler`]: local and remote routes on the other VPN
//!   members, over tunnels, parking routes whose tunnel is down
//! - [`ExtraRouteHandler`]: static routes resolved through a host route

mod chain;
mod env;
mod extra;
mod local;
mod remote;
mod types;

pub use chain::{ChainOutcome, HandlerChain, HandlerChainBuilder};
pub use env::{HandlerEnv, Undo};
pub use extra::ExtraRouteHandler;
pub use local::LocalRouteHandler;
pub use remote::RemoteRouteHandler;
pub use types::{DpnScope, HandlerStatus, RouteContext, RouteHandler};

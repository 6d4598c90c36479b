//! FIB orchestration: collaborators, errors, shared state and the
//! [`FibOrch`] facade.

mod callbacks;
mod error;
mod orch;
mod state;
mod vpn_cache;

pub use callbacks::{
    FibCallbacks, FlowProgrammer, FlowRequest, RouteSource, VpnIdResolver, VpnMembership,
};
pub use error::{FibError, Result};
pub use orch::{FibOrch, FibOrchConfig};
pub use state::{FibState, FibStats, FibStatsSnapshot};
pub use vpn_cache::VpnIdCache;

//! Tunnel-state tracking and reconciliation.
//!
//! [`TunnelStateTable`] remembers the last reported state of every tunnel
//! pair, [`InstalledIndex`] which routes ride each pair, and
//! [`TunnelReconciler`] turns tunnel transitions into replays (up) or
//! requeues (down, with [`TunnelDownPolicy::Requeue`]).

mod reconciler;
mod state;

pub use reconciler::{ReplayReport, TunnelReconciler};
pub use state::{InstalledIndex, TunnelDownPolicy, TunnelStateTable};

//! Notification dispatch for fibmanagerd.

mod event;
mod fibdaemon;
mod startup;

pub use event::{EventKey, FibEvent};
pub use fibdaemon::{
    DaemonCounters, DaemonStatsSnapshot, FibDaemon, FibDaemonConfig, ShutdownHandle,
};
pub use startup::{wait_for_route_source, RouteSourceReady};

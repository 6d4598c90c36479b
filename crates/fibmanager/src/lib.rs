//! L3VPN FIB manager.
//!
//! Keeps the flow tables of every forwarding node (DPN) consistent with the
//! VRF route tables and with the state of the tunnel mesh between DPNs.
//!
//! # Architecture
//!
//! ```text
//! [route source] ──┐
//! [tunnel state] ──┼──> [FibDaemon] ──> [FibOrch] ──> [HandlerChain] ──> [FlowProgrammer]
//! [device state] ──┘                       │                │
//!                                          ├─ TunnelReconciler
//!                                          ├─ DeviceJoinReconciler
//!                                          └─ PendingStore <─┘
//! ```
//!
//! Routes whose tunnel is not up yet are parked in the [`pending`] store
//! under the (source DPN, destination TEP) pair they need. A tunnel-up
//! replays them, so the final forwarding state does not depend on whether
//! the route or the tunnel arrived first.
//!
//! # Key Components
//!
//! - [`fib::FibOrch`]: entry points for route, tunnel and device events and
//!   the populate/cleanup/list operations
//! - [`handler::HandlerChain`]: ordered route handlers (local, remote, extra)
//! - [`tunnel::TunnelReconciler`]: tunnel up/down handling
//! - [`device::DeviceJoinReconciler`]: per-DPN replay and cleanup
//! - [`daemon::FibDaemon`]: concurrent, per-key ordered event dispatch

pub mod audit;

pub mod config;

pub mod daemon;

pub mod device;

pub mod fib;

pub mod handler;

pub mod pending;

pub mod sim;

pub mod tunnel;

pub use config::{ConfigError, FibManagerConfig};
pub use daemon::{FibDaemon, FibDaemonConfig, FibEvent};
pub use fib::{FibCallbacks, FibError, FibOrch, FibOrchConfig, FlowRequest};
pub use handler::{ChainOutcome, HandlerChain, HandlerStatus, RouteHandler};
pub use pending::PendingStore;
pub use tunnel::TunnelDownPolicy;

//! Device lifecycle reconciliation.

mod reconciler;

pub use reconciler::{DeviceJoinReconciler, DpnReport};

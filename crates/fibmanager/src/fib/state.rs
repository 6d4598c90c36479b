//! Shared mutable bookkeeping and counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::pending::PendingStore;
use crate::tunnel::{InstalledIndex, TunnelStateTable};

/// Bookkeeping shared by the handler chain and the reconcilers.
#[derive(Debug, Default)]
pub struct FibState {
    pub pending: PendingStore,
    pub tunnels: TunnelStateTable,
    pub installed: InstalledIndex,
}

impl FibState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// FIB manager statistics.
#[derive(Debug, Default)]
pub struct FibStats {
    flows_installed: AtomicU64,
    flows_removed: AtomicU64,
    routes_parked: AtomicU64,
    routes_drained: AtomicU64,
    stale_dropped: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`FibStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FibStatsSnapshot {
    pub flows_installed: u64,
    pub flows_removed: u64,
    pub routes_parked: u64,
    pub routes_drained: u64,
    pub stale_dropped: u64,
    pub failures: u64,
}

impl FibStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow_installed(&self) {
        self.flows_installed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flow_removed(&self) {
        self.flows_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_parked(&self) {
        self.routes_parked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn routes_drained(&self, count: usize) {
        self.routes_drained.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn stale_dropped(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FibStatsSnapshot {
        FibStatsSnapshot {
            flows_installed: self.flows_installed.load(Ordering::Relaxed),
            flows_removed: self.flows_removed.load(Ordering::Relaxed),
            routes_parked: self.routes_parked.load(Ordering::Relaxed),
            routes_drained: self.routes_drained.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

//! Tunnel-state reconciler.

use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use vpn_types::{PendingFibEntry, TunnelEndpointPair, TunnelOperState, TunnelStateEvent};

use crate::fib::{FibError, FlowRequest, Result, VpnIdCache};
use crate::handler::{HandlerChain, HandlerEnv, RouteContext};

use super::state::TunnelDownPolicy;

/// What a tunnel transition did to the routes waiting on (or riding) it.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub pair: TunnelEndpointPair,
    pub state: TunnelOperState,
    /// Entries drained from the pending store.
    pub drained: usize,
    /// Drained entries pushed through the chain successfully.
    pub replayed: usize,
    /// Drained entries whose route no longer exists, or was withdrawn while
    /// being replayed.
    pub stale: usize,
    /// Installed routes moved back to pending on tunnel-down.
    pub requeued: usize,
    #[serde(skip)]
    pub failed: Vec<(PendingFibEntry, FibError)>,
}

impl ReplayReport {
    fn new(pair: TunnelEndpointPair, state: TunnelOperState) -> Self {
        Self {
            pair,
            state,
            drained: 0,
            replayed: 0,
            stale: 0,
            requeued: 0,
            failed: Vec::new(),
        }
    }

    /// True when the transition touched no route.
    pub fn is_noop(&self) -> bool {
        self.drained == 0 && self.requeued == 0 && self.failed.is_empty()
    }
}

/// Drives pending replays and tunnel-down handling.
///
/// Tunnel-up marks the pair operational *before* draining. Together with
/// [`PendingStore::park_unless`](crate::pending::PendingStore::park_unless)
/// this guarantees that a concurrently parked route is either drained here
/// or programmed directly by its handler.
pub struct TunnelReconciler {
    chain: Arc<HandlerChain>,
    env: Arc<HandlerEnv>,
    vpn_ids: Arc<VpnIdCache>,
    policy: TunnelDownPolicy,
}

impl TunnelReconciler {
    pub fn new(
        chain: Arc<HandlerChain>,
        env: Arc<HandlerEnv>,
        vpn_ids: Arc<VpnIdCache>,
        policy: TunnelDownPolicy,
    ) -> Self {
        Self {
            chain,
            env,
            vpn_ids,
            policy,
        }
    }

    pub fn policy(&self) -> TunnelDownPolicy {
        self.policy
    }

    /// Applies a tunnel add/update notification.
    pub async fn on_tunnel_state(&self, event: &TunnelStateEvent) -> ReplayReport {
        let pair = event.pair();
        let previous = self.env.state.tunnels.set(pair, event.state);
        if previous != event.state {
            info!("TunnelReconciler: {} {} -> {}", pair, previous, event.state);
        }

        match event.state {
            TunnelOperState::Up => self.replay(pair).await,
            TunnelOperState::Down => match self.policy {
                TunnelDownPolicy::Retain => ReplayReport::new(pair, TunnelOperState::Down),
                TunnelDownPolicy::Requeue => self.requeue(pair).await,
            },
        }
    }

    async fn replay(&self, pair: TunnelEndpointPair) -> ReplayReport {
        let mut report = ReplayReport::new(pair, TunnelOperState::Up);
        let drained = self.env.state.pending.drain_pending(&pair);
        if drained.is_empty() {
            debug!("TunnelReconciler: nothing pending on {}", pair);
            return report;
        }

        report.drained = drained.len();
        self.env.stats.routes_drained(drained.len());

        for item in drained {
            match self.replay_one(pair, &item).await {
                Ok(true) => report.replayed += 1,
                Ok(false) => {
                    debug!("TunnelReconciler: {} is gone, dropping", item);
                    self.env.stats.stale_dropped();
                    report.stale += 1;
                }
                Err(e) => {
                    warn!("TunnelReconciler: replay of {} over {} failed: {}", item, pair, e);
                    self.env.stats.failure();
                    report.failed.push((item, e));
                }
            }
        }

        info!(
            "TunnelReconciler: {} up, replayed {}/{} ({} stale, {} failed)",
            pair,
            report.replayed,
            report.drained,
            report.stale,
            report.failed.len()
        );
        report
    }

    /// Returns false if the route no longer exists.
    async fn replay_one(&self, pair: TunnelEndpointPair, item: &PendingFibEntry) -> Result<bool> {
        let Some(entry) = self
            .env
            .callbacks
            .routes
            .vrf_entry(&item.rd, &item.prefix)
            .await?
        else {
            return Ok(false);
        };

        let vpn_id = self.vpn_ids.resolve(&item.rd).await?;
        let ctx = RouteContext::new(item.rd, vpn_id).scoped(pair.src_dpn);
        self.chain.create(&ctx, &entry).await?;

        // The route may have been withdrawn while its flows were installed.
        if !self.env.route_exists(&item.rd, &item.prefix).await? {
            debug!(
                "TunnelReconciler: {} withdrawn during replay, removing from {}",
                item, pair.src_dpn
            );
            self.chain.remove(&ctx, &entry).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn requeue(&self, pair: TunnelEndpointPair) -> ReplayReport {
        let mut report = ReplayReport::new(pair, TunnelOperState::Down);

        for item in self.env.state.installed.take(&pair) {
            match self.requeue_one(pair, &item).await {
                Ok(true) => report.requeued += 1,
                Ok(false) => {
                    self.env.stats.stale_dropped();
                    report.stale += 1;
                }
                Err(e) => {
                    warn!("TunnelReconciler: requeue of {} from {} failed: {}", item, pair, e);
                    self.env.state.installed.mark(pair, item.rd, item.prefix);
                    self.env.stats.failure();
                    report.failed.push((item, e));
                }
            }
        }

        if report.requeued > 0 {
            info!(
                "TunnelReconciler: {} down, moved {} routes back to pending",
                pair, report.requeued
            );
        }
        report
    }

    async fn requeue_one(&self, pair: TunnelEndpointPair, item: &PendingFibEntry) -> Result<bool> {
        let Some(entry) = self
            .env
            .callbacks
            .routes
            .vrf_entry(&item.rd, &item.prefix)
            .await?
        else {
            return Ok(false);
        };

        let vpn_id = self.vpn_ids.resolve(&item.rd).await?;
        let request = FlowRequest::new(pair.src_dpn, vpn_id, &entry, pair.dst_tep);
        self.env.callbacks.flows.remove(&request).await?;
        self.env.stats.flow_removed();

        if self.env.state.pending.add_pending(pair, item.rd, item.prefix) {
            self.env.stats.route_parked();
        }
        Ok(true)
    }

    /// Deletes the pending record of `pair` if nothing is left in it.
    pub fn collect_garbage(&self, pair: &TunnelEndpointPair) -> bool {
        self.env.state.pending.remove_if_empty(pair)
    }

    /// Deletes every empty pending record.
    pub fn sweep_stale(&self) -> usize {
        let removed = self.env.state.pending.remove_empty_records();
        if removed > 0 {
            debug!("TunnelReconciler: swept {} empty pending records", removed);
        }
        removed
    }
}

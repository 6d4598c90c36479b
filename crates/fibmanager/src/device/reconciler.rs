//! Device-join reconciler.

use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use vpn_types::{
    DpnId, PendingFibEntry, RouteDistinguisher, RouteOrigin, TunnelEndpointPair, VpnId, VrfEntry,
};

use crate::fib::{FibError, FlowRequest, Result, VpnIdCache};
use crate::handler::{HandlerChain, HandlerEnv, RouteContext};

/// Outcome of a per-device replay or cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct DpnReport {
    pub dpn: DpnId,
    /// VPNs walked.
    pub vpns: usize,
    /// Routes pushed through the chain.
    pub routes: usize,
    /// Pending entries pruned (cleanup only).
    pub pruned: usize,
    /// Flows left over a down tunnel, removed so the replay parks their
    /// routes again (join only).
    pub withdrawn: usize,
    #[serde(skip)]
    pub failed: Vec<(PendingFibEntry, FibError)>,
}

impl DpnReport {
    fn new(dpn: DpnId) -> Self {
        Self {
            dpn,
            vpns: 0,
            routes: 0,
            pruned: 0,
            withdrawn: 0,
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Rebuilds or tears down the forwarding state of one DPN.
pub struct DeviceJoinReconciler {
    chain: Arc<HandlerChain>,
    env: Arc<HandlerEnv>,
    vpn_ids: Arc<VpnIdCache>,
}

impl DeviceJoinReconciler {
    pub fn new(chain: Arc<HandlerChain>, env: Arc<HandlerEnv>, vpn_ids: Arc<VpnIdCache>) -> Self {
        Self {
            chain,
            env,
            vpn_ids,
        }
    }

    /// Replays every route of every VPN `dpn` participates in.
    ///
    /// The DPN may have restarted with an empty flow table, so whatever the
    /// installed index remembers for it is dropped first and every route is
    /// programmed again. Flows kept over a tunnel that is now down are
    /// removed from the device, and the replay parks their routes until the
    /// tunnel returns.
    pub async fn on_dpn_operational(&self, dpn: DpnId) -> Result<DpnReport> {
        let mut report = DpnReport::new(dpn);
        let forgotten = self.env.state.installed.forget_dpn(dpn);
        if !forgotten.is_empty() {
            debug!(
                "DeviceJoinReconciler: dropped {} installed records of {}",
                forgotten.len(),
                dpn
            );
        }
        for (pair, item) in forgotten {
            match self.withdraw_retained(pair, &item).await {
                Ok(true) => report.withdrawn += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "DeviceJoinReconciler: cannot remove {} over down tunnel {}: {}",
                        item, pair, e
                    );
                    self.env.state.installed.mark(pair, item.rd, item.prefix);
                    self.env.stats.failure();
                    report.failed.push((item, e));
                }
            }
        }

        let vpns = self.env.callbacks.membership.vpns_for_dpn(dpn).await?;
        report.vpns = vpns.len();

        for vpn_id in vpns {
            let rds = self.env.callbacks.membership.rds_for_vpn(vpn_id).await?;
            for rd in rds {
                self.vpn_ids.remember(rd, vpn_id);
                self.replay_rd(dpn, vpn_id, rd, &mut report).await?;
            }
        }

        info!(
            "DeviceJoinReconciler: {} operational, replayed {} routes in {} VPNs ({} withdrawn, {} failed)",
            dpn,
            report.routes,
            report.vpns,
            report.withdrawn,
            report.failed.len()
        );
        Ok(report)
    }

    /// Programs every route of `rd` on `dpn`.
    pub async fn populate(&self, dpn: DpnId, vpn_id: VpnId, rd: RouteDistinguisher) -> Result<DpnReport> {
        let mut report = DpnReport::new(dpn);
        report.vpns = 1;
        self.replay_rd(dpn, vpn_id, rd, &mut report).await?;
        Ok(report)
    }

    /// Removes every route of `rd` from `dpn` and prunes what is parked for
    /// it there.
    pub async fn cleanup(&self, dpn: DpnId, vpn_id: VpnId, rd: RouteDistinguisher) -> Result<DpnReport> {
        let mut report = DpnReport::new(dpn);
        report.vpns = 1;

        let ctx = RouteContext::new(rd, vpn_id).scoped(dpn);
        for entry in self.env.callbacks.routes.vrf_entries(&rd).await? {
            match self.chain.remove(&ctx, &entry).await {
                Ok(_) => report.routes += 1,
                Err(e) => {
                    warn!(
                        "DeviceJoinReconciler: cleanup of {} {} on {} failed: {}",
                        rd, entry.prefix, dpn, e
                    );
                    self.env.stats.failure();
                    report
                        .failed
                        .push((PendingFibEntry::new(rd, entry.prefix), e));
                }
            }
        }

        report.pruned = self.env.state.pending.remove_rd_for_dpn(dpn, &rd);
        Ok(report)
    }

    async fn replay_rd(
        &self,
        dpn: DpnId,
        vpn_id: VpnId,
        rd: RouteDistinguisher,
        report: &mut DpnReport,
    ) -> Result<()> {
        let ctx = RouteContext::new(rd, vpn_id).scoped(dpn);
        for entry in self.env.callbacks.routes.vrf_entries(&rd).await? {
            match self.replay_one(&ctx, &entry).await {
                Ok(true) => report.routes += 1,
                Ok(false) => self.env.stats.stale_dropped(),
                Err(e) => {
                    warn!(
                        "DeviceJoinReconciler: {} {} on {} failed: {}",
                        rd, entry.prefix, dpn, e
                    );
                    self.env.stats.failure();
                    report
                        .failed
                        .push((PendingFibEntry::new(rd, entry.prefix), e));
                }
            }
        }
        Ok(())
    }

    /// Returns false if the route was withdrawn while it was programmed.
    async fn replay_one(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<bool> {
        self.chain.create(ctx, entry).await?;
        if self.env.route_exists(&entry.rd, &entry.prefix).await? {
            return Ok(true);
        }
        debug!(
            "DeviceJoinReconciler: {} {} withdrawn during replay, removing",
            entry.rd, entry.prefix
        );
        self.chain.remove(ctx, entry).await?;
        Ok(false)
    }

    /// Removes the flow of `item` over `pair` from the device if `pair` is a
    /// tunnel that is down. Returns false when there was nothing to remove.
    async fn withdraw_retained(
        &self,
        pair: TunnelEndpointPair,
        item: &PendingFibEntry,
    ) -> Result<bool> {
        if self.env.state.tunnels.is_up(&pair) || self.env.is_local(pair).await? {
            return Ok(false);
        }

        let vpn_id = self.vpn_ids.resolve(&item.rd).await?;
        let current = self
            .env
            .callbacks
            .routes
            .vrf_entry(&item.rd, &item.prefix)
            .await?;
        let entry = current.unwrap_or_else(|| {
            VrfEntry::new(item.rd, item.prefix, RouteOrigin::Remote).with_nexthop(pair.dst_tep)
        });
        let request = FlowRequest::new(pair.src_dpn, vpn_id, &entry, pair.dst_tep);
        self.env.callbacks.flows.remove(&request).await?;
        self.env.stats.flow_removed();
        debug!("DeviceJoinReconciler: removed {} retained over {}", request, pair);
        Ok(true)
    }
}

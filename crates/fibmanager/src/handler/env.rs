//! Collaborators and bookkeeping shared by the built-in handlers.

use log::{debug, error, warn};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use vpn_types::{DpnId, IpPrefix, RouteDistinguisher, TunnelEndpointPair, VrfEntry};

use crate::fib::{FibCallbacks, FibState, FibStats, FlowRequest, Result};
use crate::pending::ParkOutcome;

use super::types::{DpnScope, RouteContext};

/// Work done by one handler invocation, kept so it can be undone.
#[derive(Debug, Default)]
pub struct Undo {
    installed: Vec<(TunnelEndpointPair, FlowRequest)>,
    parked: Vec<(TunnelEndpointPair, IpPrefix)>,
}

impl Undo {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.parked.is_empty()
    }
}

/// Everything a route handler needs to program or park a route.
///
/// Installed flows are recorded per (DPN, TEP) in the installed index. For a
/// DPN that owns the TEP itself the pair is degenerate and never sees a
/// tunnel event, but recording it keeps removal uniform.
pub struct HandlerEnv {
    pub callbacks: FibCallbacks,
    pub state: Arc<FibState>,
    pub stats: Arc<FibStats>,
}

impl HandlerEnv {
    pub fn new(callbacks: FibCallbacks, state: Arc<FibState>, stats: Arc<FibStats>) -> Self {
        Self {
            callbacks,
            state,
            stats,
        }
    }

    /// DPNs an invocation should program.
    pub async fn member_dpns(&self, ctx: &RouteContext) -> Result<Vec<DpnId>> {
        match ctx.scope {
            DpnScope::AllMembers => self.callbacks.membership.dpns_for_vpn(ctx.vpn_id).await,
            DpnScope::Only(dpn) => Ok(vec![dpn]),
        }
    }

    /// DPNs terminating `tep`.
    pub async fn tep_owners(&self, tep: IpAddr) -> Result<BTreeSet<DpnId>> {
        let owners = self.callbacks.membership.dpns_for_tep(tep).await?;
        Ok(owners.into_iter().collect())
    }

    /// Whether the route source still holds (rd, prefix).
    pub async fn route_exists(
        &self,
        rd: &RouteDistinguisher,
        prefix: &IpPrefix,
    ) -> Result<bool> {
        Ok(self.callbacks.routes.vrf_entry(rd, prefix).await?.is_some())
    }

    /// Installs `entry` on a DPN that reaches `tep` without a tunnel.
    pub async fn install_local(
        &self,
        ctx: &RouteContext,
        entry: &VrfEntry,
        dpn: DpnId,
        tep: IpAddr,
        undo: &mut Undo,
    ) -> Result<()> {
        let pair = TunnelEndpointPair::new(dpn, tep);
        if self.state.installed.contains(&pair, &ctx.rd, &entry.prefix) {
            debug!("{} {} already installed on {}", ctx.rd, entry.prefix, dpn);
            return Ok(());
        }
        self.install(ctx, entry, pair, undo).await
    }

    /// Installs `entry` on `dpn` towards `tep` if the tunnel is up, parks it
    /// otherwise.
    pub async fn install_or_park(
        &self,
        ctx: &RouteContext,
        entry: &VrfEntry,
        dpn: DpnId,
        tep: IpAddr,
        undo: &mut Undo,
    ) -> Result<()> {
        let pair = TunnelEndpointPair::new(dpn, tep);
        if self.state.installed.contains(&pair, &ctx.rd, &entry.prefix) {
            debug!("{} {} already installed over {}", ctx.rd, entry.prefix, pair);
            return Ok(());
        }

        let tunnels = &self.state.tunnels;
        match self
            .state
            .pending
            .park_unless(pair, ctx.rd, entry.prefix, || tunnels.is_up(&pair))
        {
            ParkOutcome::Parked => {
                debug!(
                    "Tunnel {} not up, parked {} {}",
                    pair, ctx.rd, entry.prefix
                );
                self.stats.route_parked();
                undo.parked.push((pair, entry.prefix));
                Ok(())
            }
            ParkOutcome::AlreadyParked => Ok(()),
            ParkOutcome::Ready => self.install(ctx, entry, pair, undo).await,
        }
    }

    async fn install(
        &self,
        ctx: &RouteContext,
        entry: &VrfEntry,
        pair: TunnelEndpointPair,
        undo: &mut Undo,
    ) -> Result<()> {
        let request = FlowRequest::new(pair.src_dpn, ctx.vpn_id, entry, pair.dst_tep);
        self.callbacks.flows.install(&request).await?;
        self.state.installed.mark(pair, ctx.rd, entry.prefix);
        self.stats.flow_installed();
        debug!("Installed {}", request);
        undo.installed.push((pair, request));
        Ok(())
    }

    /// Removes the flow installed for `entry` over `pair`.
    pub async fn withdraw(
        &self,
        ctx: &RouteContext,
        entry: &VrfEntry,
        pair: TunnelEndpointPair,
    ) -> Result<()> {
        let request = FlowRequest::new(pair.src_dpn, ctx.vpn_id, entry, pair.dst_tep);
        self.callbacks.flows.remove(&request).await?;
        self.state.installed.unmark(&pair, &ctx.rd, &entry.prefix);
        self.stats.flow_removed();
        debug!("Removed {}", request);
        Ok(())
    }

    /// Unparks and withdraws `entry` everywhere within the context's scope.
    ///
    /// Works from the bookkeeping rather than from the entry's next-hops so
    /// it also cleans up after routes whose resolution has since changed.
    /// Keeps going after a failed removal and returns the first error.
    pub async fn withdraw_all(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<usize> {
        self.withdraw_where(ctx, entry, false).await
    }

    /// Like [`withdraw_all`](Self::withdraw_all), but leaves alone flows
    /// installed on a DPN that owns the TEP they point at.
    pub async fn withdraw_tunneled(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<usize> {
        self.withdraw_where(ctx, entry, true).await
    }

    async fn withdraw_where(
        &self,
        ctx: &RouteContext,
        entry: &VrfEntry,
        tunneled_only: bool,
    ) -> Result<usize> {
        for pair in self.state.pending.pairs_for(&ctx.rd, &entry.prefix) {
            if ctx.scope.admits(pair.src_dpn) {
                self.state.pending.remove_pending(&pair, &ctx.rd, &entry.prefix);
            }
        }

        let mut removed = 0;
        let mut first_err = None;
        for pair in self.state.installed.pairs_for(&ctx.rd, &entry.prefix) {
            if !ctx.scope.admits(pair.src_dpn) {
                continue;
            }
            if tunneled_only && self.is_local(pair).await? {
                continue;
            }
            match self.withdraw(ctx, entry, pair).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!("Failed to withdraw {} {} over {}: {}", ctx.rd, entry.prefix, pair, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// True when the source DPN of `pair` terminates its TEP itself.
    pub async fn is_local(&self, pair: TunnelEndpointPair) -> Result<bool> {
        Ok(self.tep_owners(pair.dst_tep).await?.contains(&pair.src_dpn))
    }

    /// Undoes everything recorded in `undo`, newest first.
    pub async fn rollback(&self, ctx: &RouteContext, undo: Undo) {
        for (pair, request) in undo.installed.into_iter().rev() {
            if let Err(e) = self.callbacks.flows.remove(&request).await {
                error!("Rollback of {} failed: {}", request, e);
            }
            self.state.installed.unmark(&pair, &ctx.rd, &request.prefix());
        }
        for (pair, prefix) in undo.parked {
            self.state.pending.remove_pending(&pair, &ctx.rd, &prefix);
        }
    }
}

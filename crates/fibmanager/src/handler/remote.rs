//! Handler that realizes routes over tunnels.

use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use vpn_types::{RouteOrigin, VrfEntry};

use crate::fib::Result;

use super::env::{HandlerEnv, Undo};
use super::types::{HandlerStatus, RouteContext, RouteHandler};

/// Programs local and remote routes on every VPN member that reaches the
/// next-hop through a tunnel.
///
/// For each (DPN, next-hop) the tunnel from the DPN to the next-hop TEP must
/// be up; otherwise the route is parked in the pending store until it is.
/// DPNs that own a next-hop TEP are skipped for that next-hop, on removal
/// too: their flows belong to [`LocalRouteHandler`](super::LocalRouteHandler).
pub struct RemoteRouteHandler {
    env: Arc<HandlerEnv>,
}

impl RemoteRouteHandler {
    pub fn new(env: Arc<HandlerEnv>) -> Self {
        Self { env }
    }

    async fn program(&self, ctx: &RouteContext, entry: &VrfEntry, undo: &mut Undo) -> Result<()> {
        let members = self.env.member_dpns(ctx).await?;
        for nexthop in entry.nexthops() {
            let owners = self.env.tep_owners(nexthop).await?;
            for dpn in members.iter().filter(|dpn| !owners.contains(*dpn)) {
                self.env
                    .install_or_park(ctx, entry, *dpn, nexthop, undo)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RouteHandler for RemoteRouteHandler {
    fn name(&self) -> &str {
        "RemoteRouteHandler"
    }

    fn wants_to_process(&self, entry: &VrfEntry) -> bool {
        matches!(entry.origin, RouteOrigin::Local | RouteOrigin::Remote)
    }

    async fn create_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus> {
        if entry.is_unresolved() {
            warn!(
                "RemoteRouteHandler: {} {} has no next-hop, nothing to program",
                ctx.rd, entry.prefix
            );
            return Ok(HandlerStatus::ProcessingCompleted);
        }

        let mut undo = Undo::default();
        if let Err(e) = self.program(ctx, entry, &mut undo).await {
            info!(
                "RemoteRouteHandler: rolling back {} {} after error: {}",
                ctx.rd, entry.prefix, e
            );
            self.env.rollback(ctx, undo).await;
            return Err(e);
        }
        Ok(HandlerStatus::ProcessingCompleted)
    }

    async fn remove_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus> {
        self.env.withdraw_tunneled(ctx, entry).await?;
        Ok(HandlerStatus::ProcessingCompleted)
    }
}

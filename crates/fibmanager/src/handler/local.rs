//! Handler for routes originated on a DPN of this fabric.

use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use vpn_types::{RouteOrigin, TunnelEndpointPair, VrfEntry};

use crate::fib::Result;

use super::env::{HandlerEnv, Undo};
use super::types::{HandlerStatus, RouteContext, RouteHandler};

/// Installs a local route on the DPN(s) that own its next-hop TEP.
///
/// Always continues, so the remote handler can install the same route on
/// the other VPN members.
pub struct LocalRouteHandler {
    env: Arc<HandlerEnv>,
}

impl LocalRouteHandler {
    pub fn new(env: Arc<HandlerEnv>) -> Self {
        Self { env }
    }

    async fn program(&self, ctx: &RouteContext, entry: &VrfEntry, undo: &mut Undo) -> Result<()> {
        for nexthop in entry.nexthops() {
            for dpn in self.env.tep_owners(nexthop).await? {
                if ctx.scope.admits(dpn) {
                    self.env
                        .install_local(ctx, entry, dpn, nexthop, undo)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RouteHandler for LocalRouteHandler {
    fn name(&self) -> &str {
        "LocalRouteHandler"
    }

    fn wants_to_process(&self, entry: &VrfEntry) -> bool {
        entry.origin == RouteOrigin::Local
    }

    async fn create_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus> {
        let mut undo = Undo::default();
        if let Err(e) = self.program(ctx, entry, &mut undo).await {
            info!(
                "LocalRouteHandler: rolling back {} {} after error: {}",
                ctx.rd, entry.prefix, e
            );
            self.env.rollback(ctx, undo).await;
            return Err(e);
        }
        Ok(HandlerStatus::ProcessingContinue)
    }

    async fn remove_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus> {
        for nexthop in entry.nexthops() {
            for dpn in self.env.tep_owners(nexthop).await? {
                let pair = TunnelEndpointPair::new(dpn, nexthop);
                if ctx.scope.admits(dpn)
                    && self
                        .env
                        .state
                        .installed
                        .contains(&pair, &ctx.rd, &entry.prefix)
                {
                    self.env.withdraw(ctx, entry, pair).await?;
                } else {
                    debug!(
                        "LocalRouteHandler: {} {} not installed on {}",
                        ctx.rd, entry.prefix, dpn
                    );
                }
            }
        }
        Ok(HandlerStatus::ProcessingContinue)
    }
}

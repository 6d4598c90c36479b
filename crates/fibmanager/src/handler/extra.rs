//! Handler for extra (static) routes.

use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use vpn_types::{IpPrefix, RouteOrigin, VrfEntry};

use crate::fib::Result;

use super::env::{HandlerEnv, Undo};
use super::types::{HandlerStatus, RouteContext, RouteHandler};

/// Programs static routes whose next-hop is an address inside the VRF.
///
/// Each next-hop is resolved through its host route (/32 or /128) in the
/// same VRF; the static prefix is then installed towards the TEP(s) of that
/// host route. A next-hop without a host route is skipped with a warning.
pub struct ExtraRouteHandler {
    env: Arc<HandlerEnv>,
}

impl ExtraRouteHandler {
    pub fn new(env: Arc<HandlerEnv>) -> Self {
        Self { env }
    }

    async fn program(&self, ctx: &RouteContext, entry: &VrfEntry, undo: &mut Undo) -> Result<()> {
        let members = self.env.member_dpns(ctx).await?;

        for nexthop in entry.nexthops() {
            let host = IpPrefix::host(nexthop);
            let Some(resolved) = self.env.callbacks.routes.vrf_entry(&ctx.rd, &host).await? else {
                warn!(
                    "ExtraRouteHandler: next-hop {} of {} {} has no host route, skipping",
                    nexthop, ctx.rd, entry.prefix
                );
                continue;
            };

            for tep in resolved.nexthops() {
                let owners = self.env.tep_owners(tep).await?;
                for dpn in &members {
                    if owners.contains(dpn) {
                        self.env.install_local(ctx, entry, *dpn, tep, undo).await?;
                    } else {
                        self.env.install_or_park(ctx, entry, *dpn, tep, undo).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RouteHandler for ExtraRouteHandler {
    fn name(&self) -> &str {
        "ExtraRouteHandler"
    }

    fn wants_to_process(&self, entry: &VrfEntry) -> bool {
        entry.origin == RouteOrigin::Static
    }

    async fn create_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus> {
        let mut undo = Undo::default();
        if let Err(e) = self.program(ctx, entry, &mut undo).await {
            info!(
                "ExtraRouteHandler: rolling back {} {} after error: {}",
                ctx.rd, entry.prefix, e
            );
            self.env.rollback(ctx, undo).await;
            return Err(e);
        }
        Ok(HandlerStatus::ProcessingCompleted)
    }

    async fn remove_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus> {
        self.env.withdraw_all(ctx, entry).await?;
        Ok(HandlerStatus::ProcessingCompleted)
    }
}

//! Route handler trait and invocation context.

use async_trait::async_trait;
use std::fmt;
use vpn_types::{DpnId, RouteDistinguisher, VpnId, VrfEntry};

use crate::fib::Result;

/// Whether the chain should offer the route to later handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// Stop; this handler fully handled the route.
    ProcessingCompleted,
    /// Continue with the next handler.
    ProcessingContinue,
}

/// Which DPNs an invocation may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpnScope {
    /// Every DPN participating in the VPN.
    AllMembers,
    /// A single DPN (device join, populate, cleanup, tunnel replay).
    Only(DpnId),
}

impl DpnScope {
    /// Returns true if `dpn` is in scope. `AllMembers` admits everything;
    /// callers filter by membership separately.
    pub fn admits(&self, dpn: DpnId) -> bool {
        match self {
            DpnScope::AllMembers => true,
            DpnScope::Only(only) => *only == dpn,
        }
    }
}

impl fmt::Display for DpnScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpnScope::AllMembers => write!(f, "all"),
            DpnScope::Only(dpn) => write!(f, "{}", dpn),
        }
    }
}

/// Per-invocation context handed to every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteContext {
    pub rd: RouteDistinguisher,
    pub vpn_id: VpnId,
    pub scope: DpnScope,
}

impl RouteContext {
    pub fn new(rd: RouteDistinguisher, vpn_id: VpnId) -> Self {
        Self {
            rd,
            vpn_id,
            scope: DpnScope::AllMembers,
        }
    }

    pub fn scoped(mut self, dpn: DpnId) -> Self {
        self.scope = DpnScope::Only(dpn);
        self
    }
}

/// One stage of the route handler chain.
///
/// A handler that returns an error must have undone whatever it programmed
/// or parked for this route in the same call.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Returns true if this handler claims the entry. Must be side-effect
    /// free.
    fn wants_to_process(&self, entry: &VrfEntry) -> bool;

    async fn create_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus>;

    /// Replaces `old` with `new`. The default removes the old forwarding
    /// state and then creates the new one.
    async fn update_flows(
        &self,
        ctx: &RouteContext,
        old: &VrfEntry,
        new: &VrfEntry,
    ) -> Result<HandlerStatus> {
        self.remove_flows(ctx, old).await?;
        self.create_flows(ctx, new).await
    }

    async fn remove_flows(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<HandlerStatus>;
}

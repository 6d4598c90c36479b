//! Ordered route handler chain.

use log::debug;
use std::fmt;
use std::sync::Arc;
use vpn_types::VrfEntry;

use crate::fib::Result;

use super::env::HandlerEnv;
use super::extra::ExtraRouteHandler;
use super::local::LocalRouteHandler;
use super::remote::RemoteRouteHandler;
use super::types::{HandlerStatus, RouteContext, RouteHandler};

/// How a route left the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// The named handler returned `ProcessingCompleted`.
    Completed(String),
    /// At least one handler claimed the route and all of them continued.
    Exhausted,
    /// No handler wanted the route.
    Unclaimed,
    /// Update without forwarding-relevant change.
    NoChange,
}

/// An ordered list of route handlers.
///
/// Each route change is offered to the handlers in order. Handlers that do
/// not want the entry are skipped; the first handler that returns
/// `ProcessingCompleted` ends the walk. Errors are returned as-is and never
/// retried here.
#[derive(Clone)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn RouteHandler>>,
}

/// Builder for [`HandlerChain`].
#[derive(Default)]
pub struct HandlerChainBuilder {
    handlers: Vec<Arc<dyn RouteHandler>>,
}

impl HandlerChainBuilder {
    /// Appends a handler.
    pub fn handler(mut self, handler: Arc<dyn RouteHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> HandlerChain {
        HandlerChain {
            handlers: self.handlers,
        }
    }
}

impl HandlerChain {
    pub fn builder() -> HandlerChainBuilder {
        HandlerChainBuilder::default()
    }

    /// Local, remote and extra-route handlers, in that order.
    pub fn with_defaults(env: Arc<HandlerEnv>) -> Self {
        Self::builder()
            .handler(Arc::new(LocalRouteHandler::new(Arc::clone(&env))))
            .handler(Arc::new(RemoteRouteHandler::new(Arc::clone(&env))))
            .handler(Arc::new(ExtraRouteHandler::new(env)))
            .build()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    pub async fn create(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<ChainOutcome> {
        let mut claimed = false;
        for handler in &self.handlers {
            if !handler.wants_to_process(entry) {
                continue;
            }
            claimed = true;
            let status = handler.create_flows(ctx, entry).await?;
            if status == HandlerStatus::ProcessingCompleted {
                return Ok(ChainOutcome::Completed(handler.name().to_string()));
            }
        }
        Ok(Self::fall_through(claimed, "create", ctx, entry))
    }

    pub async fn update(
        &self,
        ctx: &RouteContext,
        old: &VrfEntry,
        new: &VrfEntry,
    ) -> Result<ChainOutcome> {
        if old.forwarding_eq(new) {
            debug!(
                "HandlerChain: update of {} {} changes nothing",
                ctx.rd, new.prefix
            );
            return Ok(ChainOutcome::NoChange);
        }

        let mut claimed = false;
        for handler in &self.handlers {
            let status = match (handler.wants_to_process(old), handler.wants_to_process(new)) {
                (true, true) => handler.update_flows(ctx, old, new).await?,
                (true, false) => handler.remove_flows(ctx, old).await?,
                (false, true) => handler.create_flows(ctx, new).await?,
                (false, false) => continue,
            };
            claimed = true;
            if status == HandlerStatus::ProcessingCompleted {
                return Ok(ChainOutcome::Completed(handler.name().to_string()));
            }
        }
        Ok(Self::fall_through(claimed, "update", ctx, new))
    }

    pub async fn remove(&self, ctx: &RouteContext, entry: &VrfEntry) -> Result<ChainOutcome> {
        let mut claimed = false;
        for handler in &self.handlers {
            if !handler.wants_to_process(entry) {
                continue;
            }
            claimed = true;
            let status = handler.remove_flows(ctx, entry).await?;
            if status == HandlerStatus::ProcessingCompleted {
                return Ok(ChainOutcome::Completed(handler.name().to_string()));
            }
        }
        Ok(Self::fall_through(claimed, "remove", ctx, entry))
    }

    fn fall_through(
        claimed: bool,
        op: &str,
        ctx: &RouteContext,
        entry: &VrfEntry,
    ) -> ChainOutcome {
        if claimed {
            ChainOutcome::Exhausted
        } else {
            debug!(
                "HandlerChain: no handler for {} of {} {} ({})",
                op, ctx.rd, entry.prefix, entry.origin
            );
            ChainOutcome::Unclaimed
        }
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use vpn_types::{RouteOrigin, VpnId};

    struct Recording {
        name: &'static str,
        wants: bool,
        status: HandlerStatus,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RouteHandler for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn wants_to_process(&self, _entry: &VrfEntry) -> bool {
            self.wants
        }

        async fn create_flows(&self, _ctx: &RouteContext, _entry: &VrfEntry) -> Result<HandlerStatus> {
            self.calls.lock().unwrap().push(format!("{}:create", self.name));
            Ok(self.status)
        }

        async fn remove_flows(&self, _ctx: &RouteContext, _entry: &VrfEntry) -> Result<HandlerStatus> {
            self.calls.lock().unwrap().push(format!("{}:remove", self.name));
            Ok(self.status)
        }
    }

    fn recording(
        name: &'static str,
        wants: bool,
        status: HandlerStatus,
        calls: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn RouteHandler> {
        Arc::new(Recording {
            name,
            wants,
            status,
            calls: Arc::clone(calls),
        })
    }

    fn entry(nexthop: &str) -> VrfEntry {
        VrfEntry::new(
            "65000:100".parse().unwrap(),
            "10.1.1.0/24".parse().unwrap(),
            RouteOrigin::Remote,
        )
        .with_nexthop(nexthop.parse().unwrap())
    }

    fn ctx() -> RouteContext {
        RouteContext::new("65000:100".parse().unwrap(), VpnId(1))
    }

    #[tokio::test]
    async fn test_chain_short_circuits_on_completed() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::builder()
            .handler(recording("h1", false, HandlerStatus::ProcessingContinue, &calls))
            .handler(recording("h2", true, HandlerStatus::ProcessingCompleted, &calls))
            .handler(recording("h3", true, HandlerStatus::ProcessingCompleted, &calls))
            .build();

        let outcome = chain.create(&ctx(), &entry("192.0.2.2")).await.unwrap();

        assert_eq!(outcome, ChainOutcome::Completed("h2".to_string()));
        assert_eq!(*calls.lock().unwrap(), vec!["h2:create".to_string()]);
    }

    #[tokio::test]
    async fn test_chain_continue_reaches_next_handler() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::builder()
            .handler(recording("h1", true, HandlerStatus::ProcessingContinue, &calls))
            .handler(recording("h2", true, HandlerStatus::ProcessingContinue, &calls))
            .build();

        let outcome = chain.remove(&ctx(), &entry("192.0.2.2")).await.unwrap();

        assert_eq!(outcome, ChainOutcome::Exhausted);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["h1:remove".to_string(), "h2:remove".to_string()]
        );
    }

    #[tokio::test]
    async fn test_chain_unclaimed() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::builder()
            .handler(recording("h1", false, HandlerStatus::ProcessingCompleted, &calls))
            .build();

        let outcome = chain.create(&ctx(), &entry("192.0.2.2")).await.unwrap();
        assert_eq!(outcome, ChainOutcome::Unclaimed);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_without_forwarding_change_is_noop() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::builder()
            .handler(recording("h1", true, HandlerStatus::ProcessingCompleted, &calls))
            .build();

        let outcome = chain
            .update(&ctx(), &entry("192.0.2.2"), &entry("192.0.2.2"))
            .await
            .unwrap();

        assert_eq!(outcome, ChainOutcome::NoChange);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_default_is_remove_then_create() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::builder()
            .handler(recording("h1", true, HandlerStatus::ProcessingCompleted, &calls))
            .build();

        chain
            .update(&ctx(), &entry("192.0.2.2"), &entry("192.0.2.3"))
            .await
            .unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["h1:remove".to_string(), "h1:create".to_string()]
        );
    }
}

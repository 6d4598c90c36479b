//! FIB orchestration facade.

use async_trait::async_trait;
use fib_orch_common::Orch;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vpn_types::{DpnId, RouteDistinguisher, TunnelStateEvent, VpnId, VrfEntry};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::device::{DeviceJoinReconciler, DpnReport};
use crate::handler::{ChainOutcome, HandlerChain, HandlerEnv, RouteContext};
use crate::tunnel::{ReplayReport, TunnelDownPolicy, TunnelReconciler};

use super::callbacks::FibCallbacks;
use super::error::{FibError, Result};
use super::state::{FibState, FibStats, FibStatsSnapshot};
use super::vpn_cache::VpnIdCache;

/// Configuration for FibOrch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibOrchConfig {
    /// What to do with routes installed over a tunnel that goes down.
    #[serde(default)]
    pub tunnel_down_policy: TunnelDownPolicy,
}

/// Keeps the FIB of every DPN in line with the VRF tables and the tunnel
/// mesh.
///
/// Route notifications run through the handler chain; tunnel and device
/// events go to their reconcilers, which use the same chain. Every method
/// takes `&self` and may be called concurrently for different routes,
/// tunnels and devices.
pub struct FibOrch {
    config: FibOrchConfig,
    env: Arc<HandlerEnv>,
    chain: Arc<HandlerChain>,
    vpn_ids: Arc<VpnIdCache>,
    tunnels: TunnelReconciler,
    devices: DeviceJoinReconciler,
}

impl FibOrch {
    /// Creates a FibOrch with the default handler chain.
    pub fn new(config: FibOrchConfig, callbacks: FibCallbacks) -> Self {
        Self::with_chain(config, callbacks, HandlerChain::with_defaults)
    }

    /// Creates a FibOrch whose chain is built by `build_chain`.
    pub fn with_chain<F>(config: FibOrchConfig, callbacks: FibCallbacks, build_chain: F) -> Self
    where
        F: FnOnce(Arc<HandlerEnv>) -> HandlerChain,
    {
        let vpn_ids = Arc::new(VpnIdCache::new(Arc::clone(&callbacks.vpn_ids)));
        let env = Arc::new(HandlerEnv::new(
            callbacks,
            Arc::new(FibState::new()),
            Arc::new(FibStats::new()),
        ));
        let chain = Arc::new(build_chain(Arc::clone(&env)));
        info!("FibOrch: handler chain {:?}", chain.names());

        let tunnels = TunnelReconciler::new(
            Arc::clone(&chain),
            Arc::clone(&env),
            Arc::clone(&vpn_ids),
            config.tunnel_down_policy,
        );
        let devices =
            DeviceJoinReconciler::new(Arc::clone(&chain), Arc::clone(&env), Arc::clone(&vpn_ids));

        Self {
            config,
            env,
            chain,
            vpn_ids,
            tunnels,
            devices,
        }
    }

    pub fn config(&self) -> &FibOrchConfig {
        &self.config
    }

    pub fn state(&self) -> &FibState {
        &self.env.state
    }

    pub fn stats(&self) -> FibStatsSnapshot {
        self.env.stats.snapshot()
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    async fn context(&self, rd: &RouteDistinguisher) -> Result<RouteContext> {
        let vpn_id = self.vpn_ids.resolve(rd).await?;
        Ok(RouteContext::new(*rd, vpn_id))
    }

    fn failed<T>(&self, err: FibError) -> Result<T> {
        self.env.stats.failure();
        Err(err)
    }

    /// A route appeared in a VRF table.
    pub async fn on_vrf_entry_added(&self, entry: &VrfEntry) -> Result<ChainOutcome> {
        let ctx = match self.context(&entry.rd).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("FibOrch: cannot add {} {}: {}", entry.rd, entry.prefix, e);
                return self.failed(e);
            }
        };

        match self.chain.create(&ctx, entry).await {
            Ok(outcome) => {
                debug!("FibOrch: added {} {}: {:?}", entry.rd, entry.prefix, outcome);
                Ok(outcome)
            }
            Err(e) => {
                warn!("FibOrch: add of {} {} failed: {}", entry.rd, entry.prefix, e);
                self.failed(e)
            }
        }
    }

    /// A route was replaced. `old` and `new` must share rd and prefix.
    pub async fn on_vrf_entry_updated(&self, old: &VrfEntry, new: &VrfEntry) -> Result<ChainOutcome> {
        if old.key() != new.key() {
            return self.failed(FibError::InvalidRoute {
                rd: new.rd,
                prefix: new.prefix,
                message: format!("update replaces {} {}", old.rd, old.prefix),
            });
        }

        let ctx = match self.context(&new.rd).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("FibOrch: cannot update {} {}: {}", new.rd, new.prefix, e);
                return self.failed(e);
            }
        };

        match self.chain.update(&ctx, old, new).await {
            Ok(outcome) => {
                debug!("FibOrch: updated {} {}: {:?}", new.rd, new.prefix, outcome);
                Ok(outcome)
            }
            Err(e) => {
                warn!("FibOrch: update of {} {} failed: {}", new.rd, new.prefix, e);
                self.failed(e)
            }
        }
    }

    /// A route was withdrawn from a VRF table.
    ///
    /// Pending entries for the route are pruned even if its VPN can no
    /// longer be resolved.
    pub async fn on_vrf_entry_removed(&self, entry: &VrfEntry) -> Result<ChainOutcome> {
        let parked_on = self.env.state.pending.pairs_for(&entry.rd, &entry.prefix);

        let ctx = match self.context(&entry.rd).await {
            Ok(ctx) => ctx,
            Err(e) => {
                let pruned = self.env.state.pending.remove_route(&entry.rd, &entry.prefix);
                warn!(
                    "FibOrch: cannot remove {} {} ({} pending pruned): {}",
                    entry.rd, entry.prefix, pruned, e
                );
                return self.failed(e);
            }
        };

        let result = self.chain.remove(&ctx, entry).await;
        for pair in &parked_on {
            self.tunnels.collect_garbage(pair);
        }

        match result {
            Ok(outcome) => {
                debug!("FibOrch: removed {} {}: {:?}", entry.rd, entry.prefix, outcome);
                Ok(outcome)
            }
            Err(e) => {
                warn!("FibOrch: removal of {} {} failed: {}", entry.rd, entry.prefix, e);
                self.failed(e)
            }
        }
    }

    /// A tunnel was added or changed state.
    pub async fn on_tunnel_state(&self, event: &TunnelStateEvent) -> ReplayReport {
        let report = self.tunnels.on_tunnel_state(event).await;
        if !report.is_noop() {
            let outcome = if report.failed.is_empty() {
                AuditOutcome::Success
            } else {
                AuditOutcome::Partial
            };
            audit_log!(AuditRecord::new(
                AuditCategory::NetworkConfig,
                "FibOrch",
                format!("tunnel_{}", event.state)
            )
            .with_outcome(outcome)
            .with_object_id(report.pair.to_string())
            .with_object_type("tunnel")
            .with_details(serde_json::json!({
                "policy": self.tunnels.policy().to_string(),
                "drained": report.drained,
                "replayed": report.replayed,
                "stale": report.stale,
                "requeued": report.requeued,
                "failed": report.failed.len(),
            })));
        }
        report
    }

    /// A DPN became operational; rebuild its FIB.
    pub async fn on_dpn_operational(&self, dpn: DpnId) -> Result<DpnReport> {
        let result = self.devices.on_dpn_operational(dpn).await;
        self.audit_dpn(AuditCategory::NetworkConfig, "dpn_operational", dpn, None, &result);
        match result {
            Ok(report) => Ok(report),
            Err(e) => self.failed(e),
        }
    }

    /// Programs every route of `rd` on `dpn`, which just joined `vpn_id`.
    pub async fn populate_fib_on_new_dpn(
        &self,
        dpn: DpnId,
        vpn_id: VpnId,
        rd: RouteDistinguisher,
    ) -> Result<DpnReport> {
        self.vpn_ids.remember(rd, vpn_id);
        let result = self.devices.populate(dpn, vpn_id, rd).await;
        self.audit_dpn(
            AuditCategory::ResourceCreate,
            "populate_fib_on_new_dpn",
            dpn,
            Some(rd),
            &result,
        );
        match result {
            Ok(report) => Ok(report),
            Err(e) => self.failed(e),
        }
    }

    /// Removes every route of `rd` from `dpn`, which left `vpn_id`.
    pub async fn cleanup_dpn_for_vpn(
        &self,
        dpn: DpnId,
        vpn_id: VpnId,
        rd: RouteDistinguisher,
    ) -> Result<DpnReport> {
        let result = self.devices.cleanup(dpn, vpn_id, rd).await;
        self.audit_dpn(
            AuditCategory::ResourceDelete,
            "cleanup_dpn_for_vpn",
            dpn,
            Some(rd),
            &result,
        );
        match result {
            Ok(report) => Ok(report),
            Err(e) => self.failed(e),
        }
    }

    fn audit_dpn(
        &self,
        category: AuditCategory,
        action: &str,
        dpn: DpnId,
        rd: Option<RouteDistinguisher>,
        result: &Result<DpnReport>,
    ) {
        let record = AuditRecord::new(category, "FibOrch", action)
            .with_object_id(dpn.to_string())
            .with_object_type("dpn");

        let record = match result {
            Ok(report) => record
                .with_outcome(if report.is_clean() {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Partial
                })
                .with_details(serde_json::json!({
                    "rd": rd.map(|rd| rd.to_string()),
                    "vpns": report.vpns,
                    "routes": report.routes,
                    "pruned": report.pruned,
                    "withdrawn": report.withdrawn,
                    "failed": report.failed.len(),
                })),
            Err(e) => record
                .with_details(serde_json::json!({ "rd": rd.map(|rd| rd.to_string()) }))
                .with_error(e.to_string()),
        };
        audit_log!(record);
    }

    /// Every VRF entry the route source knows, ordered by rd then prefix.
    pub async fn list_fib_entries(&self) -> Result<Vec<String>> {
        let mut rds = self.env.callbacks.routes.route_distinguishers().await?;
        rds.sort();
        rds.dedup();

        let mut lines = Vec::new();
        for rd in rds {
            let mut entries = self.env.callbacks.routes.vrf_entries(&rd).await?;
            entries.sort_by(|a, b| a.prefix.cmp(&b.prefix));
            lines.extend(entries.iter().map(|e| e.to_string()));
        }
        Ok(lines)
    }

    /// Parked routes, one line per entry: `<pair>: <rd> <prefix>`.
    pub fn dump_pending(&self) -> Vec<String> {
        self.env
            .state
            .pending
            .snapshot()
            .into_iter()
            .flat_map(|(pair, entries)| {
                entries
                    .into_iter()
                    .map(move |entry| format!("{}: {}", pair, entry))
            })
            .collect()
    }
}

#[async_trait]
impl Orch for FibOrch {
    fn name(&self) -> &str {
        "FibOrch"
    }

    async fn do_task(&self) {
        self.tunnels.sweep_stale();
    }

    fn has_pending_tasks(&self) -> bool {
        !self.env.state.pending.is_empty()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.dump_pending()
    }
}

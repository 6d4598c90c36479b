//! FibDaemon implementation.
//!
//! The FibDaemon feeds notifications to the FibOrch. It manages:
//! - The event channel producers push into
//! - One task per notification, bounded by a semaphore
//! - Per-key ordering of notifications for the same route, tunnel or DPN
//! - Periodic pending-store sweeps and statistics
//! - Graceful shutdown, waiting for in-flight work

use fib_orch_common::{KeyedSequencer, Orch, TaskStatus};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Interval, MissedTickBehavior};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::DaemonConfig;
use crate::fib::FibOrch;
use crate::handler::ChainOutcome;

use super::event::{EventKey, FibEvent};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the FibDaemon.
#[derive(Debug, Clone)]
pub struct FibDaemonConfig {
    pub max_concurrent_tasks: usize,
    pub event_channel_capacity: usize,
    /// `None` disables the periodic statistics log.
    pub stats_interval: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for FibDaemonConfig {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

impl From<&DaemonConfig> for FibDaemonConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            max_concurrent_tasks: config.max_concurrent_tasks,
            event_channel_capacity: config.event_channel_capacity,
            stats_interval: config.stats_interval(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

/// Per-outcome notification counters.
#[derive(Debug, Default)]
pub struct DaemonCounters {
    received: AtomicU64,
    success: AtomicU64,
    invalid_entry: AtomicU64,
    failed: AtomicU64,
    ignored: AtomicU64,
    waiting_for_dependency: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStatsSnapshot {
    pub received: u64,
    pub success: u64,
    pub invalid_entry: u64,
    pub failed: u64,
    pub ignored: u64,
    pub waiting_for_dependency: u64,
    /// Queued events discarded at shutdown.
    pub dropped: u64,
}

impl DaemonStatsSnapshot {
    pub fn failures(&self) -> u64 {
        self.invalid_entry + self.failed + self.waiting_for_dependency
    }

    pub fn completed(&self) -> u64 {
        self.success + self.ignored + self.failures()
    }
}

impl DaemonCounters {
    fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    fn record(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Success => &self.success,
            TaskStatus::InvalidEntry => &self.invalid_entry,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Ignore => &self.ignored,
            TaskStatus::WaitingForDependency => &self.waiting_for_dependency,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DaemonStatsSnapshot {
        DaemonStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            invalid_entry: self.invalid_entry.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            waiting_for_dependency: self.waiting_for_dependency.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Stops a running [`FibDaemon`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("Stopping FibDaemon");
        audit_log!(AuditRecord::new(
            AuditCategory::AdminAction,
            "FibDaemon",
            "stop_requested"
        )
        .with_outcome(AuditOutcome::Success));
        self.notify.notify_one();
    }
}

/// Event dispatcher in front of a [`FibOrch`].
///
/// Producers push [`FibEvent`]s into the channel returned by
/// [`sender`](Self::sender). [`run`](Self::run) returns once every sender
/// is dropped and all accepted events are processed, or after
/// [`ShutdownHandle::shutdown`], in which case in-flight events finish and
/// events still queued are discarded.
pub struct FibDaemon {
    config: FibDaemonConfig,
    orch: Arc<FibOrch>,
    tx: mpsc::Sender<FibEvent>,
    rx: mpsc::Receiver<FibEvent>,
    shutdown: Arc<Notify>,
    counters: Arc<DaemonCounters>,
}

impl FibDaemon {
    pub fn new(config: FibDaemonConfig, orch: Arc<FibOrch>) -> Self {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));
        Self {
            config,
            orch,
            tx,
            rx,
            shutdown: Arc::new(Notify::new()),
            counters: Arc::new(DaemonCounters::default()),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<FibEvent> {
        self.tx.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            notify: Arc::clone(&self.shutdown),
        }
    }

    pub fn counters(&self) -> Arc<DaemonCounters> {
        Arc::clone(&self.counters)
    }

    pub fn orch(&self) -> Arc<FibOrch> {
        Arc::clone(&self.orch)
    }

    /// Runs the dispatch loop until shutdown or until every sender is gone.
    pub async fn run(self) -> DaemonStatsSnapshot {
        let FibDaemon {
            config,
            orch,
            tx,
            mut rx,
            shutdown,
            counters,
        } = self;
        drop(tx);

        info!(
            "Starting FibDaemon event loop (max {} concurrent tasks)",
            config.max_concurrent_tasks
        );
        audit_log!(AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "FibDaemon",
            "event_loop_started"
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "max_concurrent_tasks": config.max_concurrent_tasks,
            "event_channel_capacity": config.event_channel_capacity,
            "tunnel_down_policy": orch.config().tunnel_down_policy.to_string(),
        })));

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        let sequencer: KeyedSequencer<EventKey> = KeyedSequencer::new();
        let mut tasks = JoinSet::new();

        let mut sweep = tokio::time::interval(config.sweep_interval.max(MIN_INTERVAL));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = config.stats_interval.map(|period| {
            let mut interval = tokio::time::interval(period.max(MIN_INTERVAL));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    info!("FibDaemon: shutdown requested");
                    break;
                }
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else {
                        debug!("FibDaemon: all event senders closed");
                        break;
                    };
                    counters.received();

                    // Tickets are issued here, in arrival order.
                    let ticket = sequencer.ticket(event.key());
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        error!("FibDaemon: task semaphore closed");
                        break;
                    };

                    let orch = Arc::clone(&orch);
                    let counters = Arc::clone(&counters);
                    tasks.spawn(async move {
                        let _permit = permit;
                        let _turn = ticket.wait().await;
                        let status = process(&orch, event).await;
                        counters.record(status);
                    });
                }
                _ = sweep.tick() => {
                    orch.do_task().await;
                }
                _ = tick(&mut stats) => {
                    log_stats(&orch, &counters, tasks.len());
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("FibDaemon: notification task panicked: {}", e);
                        counters.record(TaskStatus::Failed);
                    }
                }
            }
        }

        rx.close();
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!("FibDaemon: discarding {} queued events", discarded);
            counters.dropped(discarded);
        }

        if !tasks.is_empty() {
            info!("FibDaemon: waiting for {} in-flight tasks", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("FibDaemon: notification task panicked: {}", e);
                counters.record(TaskStatus::Failed);
            }
        }

        let snapshot = counters.snapshot();
        info!("FibDaemon event loop stopped");
        audit_log!(AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "FibDaemon",
            "event_loop_stopped"
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "daemon": snapshot,
            "fib": orch.stats(),
            "pending": orch.state().pending.len(),
        })));
        snapshot
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn log_stats(orch: &FibOrch, counters: &DaemonCounters, in_flight: usize) {
    let daemon = counters.snapshot();
    let fib = orch.stats();
    info!(
        "FibDaemon: {} received, {} ok, {} ignored, {} failed, {} in flight; {} flows installed, {} removed, {} routes pending on {} tunnels, {} tunnels up",
        daemon.received,
        daemon.success,
        daemon.ignored,
        daemon.failures(),
        in_flight,
        fib.flows_installed,
        fib.flows_removed,
        orch.state().pending.len(),
        orch.state().pending.record_count(),
        orch.state().tunnels.up_count()
    );
}

async fn process(orch: &FibOrch, event: FibEvent) -> TaskStatus {
    debug!("FibDaemon: processing {} for {}", event.kind(), event.key());
    match event {
        FibEvent::VrfEntryAdded(entry) => route_status(orch.on_vrf_entry_added(&entry).await),
        FibEvent::VrfEntryUpdated { old, new } => {
            route_status(orch.on_vrf_entry_updated(&old, &new).await)
        }
        FibEvent::VrfEntryRemoved(entry) => route_status(orch.on_vrf_entry_removed(&entry).await),
        FibEvent::TunnelState(event) => {
            let report = orch.on_tunnel_state(&event).await;
            match report.failed.first() {
                Some((_, e)) => e.to_status(),
                None => TaskStatus::Success,
            }
        }
        FibEvent::DpnOperational(dpn) => match orch.on_dpn_operational(dpn).await {
            Ok(report) => match report.failed.first() {
                Some((_, e)) => e.to_status(),
                None => TaskStatus::Success,
            },
            Err(e) => e.to_status(),
        },
    }
}

fn route_status(result: crate::fib::Result<ChainOutcome>) -> TaskStatus {
    match result {
        Ok(ChainOutcome::Unclaimed) | Ok(ChainOutcome::NoChange) => TaskStatus::Ignore,
        Ok(_) => TaskStatus::Success,
        Err(e) => e.to_status(),
    }
}

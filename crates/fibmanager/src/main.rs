//! fibmanagerd entry point.
//!
//! Loads the configuration, builds the FibOrch on top of the in-process
//! collaborators seeded from the config file's `topology` section, replays
//! the seeded routes, tunnels and devices as notifications and then serves
//! the event loop until SIGINT.

use clap::Parser;
use fibmanager::audit::{AuditCategory, AuditOutcome, AuditRecord};
use fibmanager::audit_log;
use fibmanager::config::{FibManagerConfig, DEFAULT_CONFIG_PATH};
use fibmanager::daemon::{wait_for_route_source, FibDaemon, FibDaemonConfig, FibEvent};
use fibmanager::fib::{FibCallbacks, FibOrch};
use fibmanager::sim::{LoggingFlowProgrammer, StaticTopology};
use fibmanager::tunnel::TunnelDownPolicy;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// L3VPN FIB manager daemon
#[derive(Parser, Debug)]
#[command(name = "fibmanagerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Emit JSON logs through tracing instead of env_logger
    #[arg(long)]
    json_logs: bool,

    /// Maximum concurrently processed notifications
    #[arg(long)]
    max_concurrent_tasks: Option<usize>,

    /// What to do with routes over a tunnel that goes down (retain, requeue)
    #[arg(long)]
    tunnel_down_policy: Option<TunnelDownPolicy>,

    /// Startup wait for collaborators, in milliseconds
    #[arg(long)]
    dependency_wait_ms: Option<u64>,

    /// Print the pending routes and FIB listing on shutdown
    #[arg(long)]
    dump_on_exit: bool,
}

fn init_logging(level: &str, json: bool) {
    if json {
        fibmanager::audit::init_logging(level);
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match FibManagerConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(args.log_level.as_deref().unwrap_or("info"), args.json_logs);
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(max) = args.max_concurrent_tasks {
        config.daemon.max_concurrent_tasks = max;
    }
    if let Some(policy) = args.tunnel_down_policy {
        config.fib.tunnel_down_policy = policy;
    }
    if let Some(wait) = args.dependency_wait_ms {
        config.daemon.dependency_wait_ms = wait;
    }

    init_logging(&config.log_level, args.json_logs);

    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("====================================================================");
    info!("Starting fibmanagerd");
    info!("====================================================================");
    info!("Config: {}", args.config.display());
    info!("Max concurrent tasks: {}", config.daemon.max_concurrent_tasks);
    info!("Tunnel down policy: {}", config.fib.tunnel_down_policy);
    info!(
        "Topology: {} VPNs, {} TEPs, {} routes",
        config.topology.vpns.len(),
        config.topology.teps.len(),
        config.topology.routes.len()
    );

    audit_log!(AuditRecord::new(
        AuditCategory::ConfigurationChange,
        "fibmanagerd",
        "config_loaded"
    )
    .with_outcome(AuditOutcome::Success)
    .with_object_id(args.config.display().to_string())
    .with_details(serde_json::json!({
        "daemon": &config.daemon,
        "fib": &config.fib,
    })));

    let topology = Arc::new(StaticTopology::from_config(&config.topology));
    let flows = Arc::new(LoggingFlowProgrammer::new());
    let callbacks = FibCallbacks {
        routes: topology.clone(),
        vpn_ids: topology.clone(),
        membership: topology.clone(),
        flows: flows.clone(),
    };

    if let Err(e) =
        wait_for_route_source(callbacks.routes.clone(), config.daemon.dependency_wait()).await
    {
        error!("Startup failed: {}", e);
        audit_log!(AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "fibmanagerd",
            "startup"
        )
        .with_error(e.to_string()));
        return ExitCode::FAILURE;
    }

    let orch = Arc::new(FibOrch::new(config.fib.clone(), callbacks));
    let daemon = FibDaemon::new(FibDaemonConfig::from(&config.daemon), Arc::clone(&orch));
    let shutdown = daemon.shutdown_handle();
    let sender = daemon.sender();

    let seed = config.topology.clone();
    let seeder = tokio::spawn(async move {
        let events = seed
            .routes
            .into_iter()
            .map(FibEvent::VrfEntryAdded)
            .chain(seed.tunnels.into_iter().map(FibEvent::TunnelState))
            .chain(seed.operational_dpns.into_iter().map(FibEvent::DpnOperational));
        for event in events {
            if sender.send(event).await.is_err() {
                warn!("Event loop stopped before the topology was replayed");
                break;
            }
        }
        // The sender stays alive so the loop keeps serving until SIGINT.
        sender
    });

    let shutdown_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, shutting down gracefully...");
                shutdown.shutdown();
            }
            Err(err) => {
                error!("Failed to listen for ctrl-c: {}", err);
            }
        }
    });

    info!("Starting event loop...");
    let stats = daemon.run().await;

    shutdown_handle.abort();
    seeder.abort();

    info!(
        "Processed {} notifications ({} failed); {} flows installed, {} removed",
        stats.completed(),
        stats.failures(),
        flows.installs(),
        flows.removals()
    );

    if args.dump_on_exit {
        for line in orch.dump_pending() {
            info!("pending: {}", line);
        }
        match orch.list_fib_entries().await {
            Ok(lines) => lines.iter().for_each(|line| info!("fib: {}", line)),
            Err(e) => warn!("Cannot list FIB entries: {}", e),
        }
    }

    info!("====================================================================");
    info!("fibmanagerd shutdown complete");
    info!("====================================================================");

    ExitCode::SUCCESS
}

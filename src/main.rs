//! Fusion Access Operator
//!
//! Entry point for the node discovery agent, the filesystem provisioning
//! job, and the discovery reconciler.
//!
//! ```text
//! fusion-access-operator discover              node agent (DaemonSet)
//! fusion-access-operator filesystem-job        one provisioning operation (Job)
//! fusion-access-operator reconcile-discovery   LocalVolumeDiscovery controller
//! fusion-access-operator crd                   print CRD manifests
//! ```

use clap::{Args, Parser, Subcommand};
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fusion_access_operator::adapters::{
    discovery_object_reference, KubeClusterView, KubeEventSink, KubeProvisioningClient,
    KubeResultStore,
};
use fusion_access_operator::discovery::agent::DEFAULT_DISCOVERY_OBJECT_NAME;
use fusion_access_operator::discovery::reconciler::{run_controller, DEFAULT_DISCOVERY_DAEMONSET};
use fusion_access_operator::hardware::ProbeConfig;
use fusion_access_operator::{
    crd::crd_manifests, metrics::run_metrics_server, DeviceDiscovery, DiscoveryConfig,
    DiscoveryMetrics, Error, EventReporter, FilesystemJob, HostDeviceProbe, JobArgs,
    LocalVolumeDiscovery, LsblkLister, ReconcilerContext, Result, UdevFilter, UdevMonitor,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Fusion Access Operator - device discovery and filesystem provisioning
/// for IBM Storage Scale
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover block devices on this node
    Discover(DiscoverArgs),
    /// Run one filesystem provisioning operation
    FilesystemJob(JobArgs),
    /// Reconcile LocalVolumeDiscovery objects
    ReconcileDiscovery(ReconcileArgs),
    /// Print the CRD manifests
    Crd,
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    /// Node the agent runs on
    #[arg(long, env = "MY_NODE_NAME")]
    node_name: Option<String>,

    /// Namespace of the discovery objects
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Name of the parent LocalVolumeDiscovery
    #[arg(long, env = "DISCOVERY_OBJECT_NAME", default_value = DEFAULT_DISCOVERY_OBJECT_NAME)]
    discovery_object_name: String,

    /// UID of the parent LocalVolumeDiscovery
    #[arg(long, env = "DISCOVERY_OBJECT_UID")]
    discovery_object_uid: Option<String>,

    /// Seconds between periodic scans
    #[arg(long, env = "PROBE_INTERVAL_SECS", default_value = "300")]
    probe_interval_secs: u64,

    /// Seconds over which udev events are coalesced
    #[arg(long, env = "UDEV_EVENT_PERIOD_SECS", default_value = "5")]
    udev_event_period_secs: u64,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Namespace of the LocalVolumeDiscovery objects
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// DaemonSet running the discovery agent
    #[arg(long, env = "DISCOVERY_DAEMONSET", default_value = DEFAULT_DISCOVERY_DAEMONSET)]
    daemonset: String,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    info!("Starting Fusion Access Operator");
    info!("  Version: {}", fusion_access_operator::VERSION);

    let result = match cli.command {
        Command::Discover(args) => run_discover(args).await,
        Command::FilesystemJob(args) => run_filesystem_job(args).await,
        Command::ReconcileDiscovery(args) => run_reconcile_discovery(args).await,
        Command::Crd => {
            print!("{}", crd_manifests()?);
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("Operation failed: {}", e);
    }
    result
}

// =============================================================================
// Subcommands
// =============================================================================

async fn run_discover(args: DiscoverArgs) -> Result<()> {
    let config = DiscoveryConfig {
        node_name: args.node_name.unwrap_or_default(),
        namespace: args.namespace.unwrap_or_default(),
        parent_name: args.discovery_object_name,
        parent_uid: args.discovery_object_uid.unwrap_or_default(),
        probe_interval: Duration::from_secs(args.probe_interval_secs),
    };
    config.validate()?;

    info!("  Node: {}", config.node_name);
    info!("  Namespace: {}", config.namespace);
    info!("  Probe interval: {:?}", config.probe_interval);

    let client = Client::try_default().await?;
    let metrics = DiscoveryMetrics::register_default()?;

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    let udev = UdevMonitor::new(
        UdevFilter::default(),
        Duration::from_secs(args.udev_event_period_secs),
    )
    .spawn();

    let sink = KubeEventSink::new(
        client.clone(),
        &config.node_name,
        discovery_object_reference(&config.parent_name, &config.namespace, &config.parent_uid),
    );
    let reporter = EventReporter::new(Arc::new(sink), Some(config.node_name.clone()));

    let mut discovery = DeviceDiscovery::new(
        config,
        Arc::new(LsblkLister::new()),
        Arc::new(HostDeviceProbe::new(ProbeConfig::default())),
        Arc::new(KubeResultStore::new(client)),
        reporter,
        metrics,
    );

    discovery.start(shutdown_signal(), udev).await?;
    info!("Device discovery shutdown complete");
    Ok(())
}

async fn run_filesystem_job(args: JobArgs) -> Result<()> {
    let request = args.into_request()?;
    info!("  Operation: {}", request.operation());

    let client = Client::try_default().await?;
    FilesystemJob::new(Arc::new(KubeProvisioningClient::new(client)))
        .run(request)
        .await
}

async fn run_reconcile_discovery(args: ReconcileArgs) -> Result<()> {
    let namespace = args
        .namespace
        .filter(|ns| !ns.trim().is_empty())
        .ok_or_else(|| Error::Configuration("WATCH_NAMESPACE is not set".into()))?;

    let client = Client::try_default().await?;
    let api: Api<LocalVolumeDiscovery> = Api::namespaced(client.clone(), &namespace);
    let ctx = ReconcilerContext {
        cluster: Arc::new(KubeClusterView::new(client)),
        daemonset_name: args.daemonset,
    };

    run_controller(api, ctx).await;
    info!("Discovery reconciler shutdown complete");
    Ok(())
}

// =============================================================================
// Signals
// =============================================================================

/// Completes on SIGTERM or SIGINT
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(cli: &Cli) {
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

//! Device Discovery Loop
//!
//! One task per node owns the scan. It scans once at startup and then
//! waits on three things: shutdown, the periodic probe timer and udev
//! rescan signals. Only one scan is ever in flight.

use crate::crd::DiscoveredDevice;
use crate::discovery::events::EventReporter;
use crate::discovery::result::{DiscoveryResultSync, ResultIdentity};
use crate::domain::ports::{
    BlockDeviceLister, DeviceProbe, DiscoveryResultStore, DiskEvent, EventReason,
};
use crate::error::{Error, Result};
use crate::hardware::discovery::DeviceClassifier;
use crate::metrics::DiscoveryMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Name of the parent discovery object the agent reports against
pub const DEFAULT_DISCOVERY_OBJECT_NAME: &str = "auto-discover-devices";

/// Interval between periodic scans
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration of the node discovery agent
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Node the agent runs on
    pub node_name: String,
    /// Namespace of the discovery objects
    pub namespace: String,
    /// Name of the parent LocalVolumeDiscovery
    pub parent_name: String,
    /// UID of the parent LocalVolumeDiscovery
    pub parent_uid: String,
    /// Interval between periodic scans
    pub probe_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            namespace: String::new(),
            parent_name: DEFAULT_DISCOVERY_OBJECT_NAME.to_string(),
            parent_uid: String::new(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

impl DiscoveryConfig {
    /// Check that every identity field is set
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("MY_NODE_NAME", &self.node_name),
            ("WATCH_NAMESPACE", &self.namespace),
            ("DISCOVERY_OBJECT_NAME", &self.parent_name),
            ("DISCOVERY_OBJECT_UID", &self.parent_uid),
        ];
        for (var, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{} is not set", var)));
            }
        }
        if self.probe_interval.is_zero() {
            return Err(Error::Configuration("probe interval must be positive".into()));
        }
        Ok(())
    }

    fn identity(&self) -> ResultIdentity {
        ResultIdentity {
            node_name: self.node_name.clone(),
            namespace: self.namespace.clone(),
            parent_name: self.parent_name.clone(),
            parent_uid: self.parent_uid.clone(),
        }
    }
}

// =============================================================================
// Loop State
// =============================================================================

/// Where the discovery loop is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scanning,
    ShuttingDown,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Idle => write!(f, "idle"),
            LoopState::Scanning => write!(f, "scanning"),
            LoopState::ShuttingDown => write!(f, "shutting-down"),
        }
    }
}

// =============================================================================
// Device Discovery
// =============================================================================

/// Node-local device discovery agent
pub struct DeviceDiscovery {
    config: DiscoveryConfig,
    lister: Arc<dyn BlockDeviceLister>,
    classifier: Arc<DeviceClassifier>,
    results: DiscoveryResultSync,
    reporter: EventReporter,
    metrics: DiscoveryMetrics,
    /// Device list last written to the result status. `None` until the
    /// first write, so the first scan always replaces what is stored.
    disks: Option<Vec<DiscoveredDevice>>,
    state: LoopState,
}

impl DeviceDiscovery {
    pub fn new(
        config: DiscoveryConfig,
        lister: Arc<dyn BlockDeviceLister>,
        probe: Arc<dyn DeviceProbe>,
        store: Arc<dyn DiscoveryResultStore>,
        reporter: EventReporter,
        metrics: DiscoveryMetrics,
    ) -> Self {
        let results = DiscoveryResultSync::new(store, config.identity());
        Self {
            config,
            lister,
            classifier: Arc::new(DeviceClassifier::new(probe)),
            results,
            reporter,
            metrics,
            disks: None,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Devices last written to the result status
    pub fn disks(&self) -> &[DiscoveredDevice] {
        self.disks.as_deref().unwrap_or_default()
    }

    /// Run until `shutdown` completes.
    ///
    /// Fails only when the result object cannot be ensured. Scan failures
    /// are logged and retried on the next tick. When the udev channel
    /// closes the loop keeps running on the timer alone.
    pub async fn start<F>(&mut self, shutdown: F, mut udev: mpsc::Receiver<()>) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("starting device discovery on node {}", self.config.node_name);

        if let Err(e) = self.results.ensure().await {
            let message = "failed to start device discovery";
            self.reporter
                .report(DiskEvent::warning(
                    EventReason::ErrorCreatingDiscoveryResultObject,
                    format!("{}. Error: {}", message, e),
                    "",
                ))
                .await;
            return Err(e);
        }

        if let Err(e) = self.discover_devices().await {
            error!("failed to discover devices: {}", e);
        }

        tokio::pin!(shutdown);
        let mut udev_enabled = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.state = LoopState::ShuttingDown;
                    info!("shutdown signal received, exiting...");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.probe_interval) => {
                    if let Err(e) = self.discover_devices().await {
                        error!("failed to discover devices during probe interval. {}", e);
                    }
                }
                event = udev.recv(), if udev_enabled => {
                    match event {
                        Some(()) => {
                            info!("trigger probe from udev event");
                            if let Err(e) = self.discover_devices().await {
                                error!("failed to discover devices triggered from udev event. {}", e);
                            }
                        }
                        None => {
                            warn!("disabling udev monitoring");
                            udev_enabled = false;
                        }
                    }
                }
            }
        }
    }

    /// Scan once and persist the device list if it changed
    pub async fn discover_devices(&mut self) -> Result<()> {
        self.state = LoopState::Scanning;
        let result = self.scan().await;
        self.state = LoopState::Idle;
        result
    }

    async fn scan(&mut self) -> Result<()> {
        let devices = match self.lister.list_block_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                let message = "failed to discover devices";
                self.reporter
                    .report(DiskEvent::warning(
                        EventReason::ErrorListingBlockDevices,
                        format!("{}. Error: {}", message, e),
                        "",
                    ))
                    .await;
                return Err(e);
            }
        };

        // probes open devices and read host files
        let classifier = self.classifier.clone();
        let discovered = tokio::task::spawn_blocking(move || classifier.discover(&devices))
            .await
            .map_err(|e| Error::Internal(format!("device classification task failed: {}", e)))?;
        debug!("discovered devices: {:?}", discovered);
        self.metrics
            .set_discovered_devices(&self.config.node_name, discovered.len());

        if self.disks.as_ref() == Some(&discovered) {
            return Ok(());
        }

        info!("device list updated. Updating LocalVolumeDiscoveryResult status...");
        if let Err(e) = self.results.update_status(&discovered).await {
            let message = "failed to update LocalVolumeDiscoveryResult status";
            self.reporter
                .report(DiskEvent::warning(
                    EventReason::ErrorUpdatingDiscoveryResultObject,
                    format!("{}. Error: {}", message, e),
                    "",
                ))
                .await;
            return Err(e);
        }
        // only a persisted list counts as known, so a failed write is retried
        self.disks = Some(discovered);

        self.reporter
            .report(DiskEvent::success(
                EventReason::UpdatedDiscoveredDeviceList,
                "successfully updated discovered device details in the LocalVolumeDiscoveryResult resource",
                "",
            ))
            .await;
        Ok(())
    }
}

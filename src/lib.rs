//! Fusion Access Operator - Device Discovery and Filesystem Provisioning
//!
//! Node-local block device discovery and filesystem provisioning for
//! IBM Storage Scale on OpenShift.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────── node ─────────────────────────────────┐
//! │  udevadm monitor ──► UdevMonitor ──signal──┐                          │
//! │                                            ▼                          │
//! │  lsblk ──► filter ──► classify ──► dedup ──► DeviceDiscovery loop     │
//! │                                            │                          │
//! │                         LocalVolumeDiscoveryResult status + events    │
//! └───────────────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────── cluster ──────────────────────────────────┐
//! │  LocalVolumeDiscovery reconciler: orphan results, DaemonSet health    │
//! │  filesystem job: LocalDisks ──► Filesystem ──► StorageClass           │
//! │                  (phase checkpoints in Job annotations)               │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`]: Kubernetes implementations of the domain ports
//! - [`crd`]: Custom Resource Definitions
//! - [`discovery`]: Discovery agent loop, result sync and reconciler
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling
//! - [`hardware`]: Block device enumeration, classification and udev events
//! - [`metrics`]: Prometheus metrics
//! - [`provisioning`]: Filesystem job state machine
//! - [`registry`]: Image reference and pull-secret helpers

pub mod adapters;
pub mod crd;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod metrics;
pub mod provisioning;
pub mod registry;

// Re-export commonly used types
pub use crd::{
    DiscoveredDevice, LocalVolumeDiscovery, LocalVolumeDiscoveryResult,
    LocalVolumeDiscoverySpec, LocalVolumeDiscoveryStatus,
};

pub use discovery::{DeviceDiscovery, DiscoveryConfig, EventReporter, ReconcilerContext};

pub use domain::ports::{
    BlockDevice, BlockDeviceLister, DeviceProbe, DiscoveryClusterView, DiscoveryResultStore,
    EventSink, ProvisioningClient,
};

pub use error::{Error, ErrorAction, Result};

pub use hardware::{DeviceClassifier, HostDeviceProbe, LsblkLister, UdevFilter, UdevMonitor};

pub use metrics::DiscoveryMetrics;

pub use provisioning::{FilesystemJob, JobArgs, JobRequest, Operation};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

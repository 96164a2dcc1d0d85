//! Domain Ports - Core trait definitions for the Fusion Access operator
//!
//! These traits define the boundaries between the domain logic and external systems.
//! Adapters implement these traits to provide concrete functionality.

use crate::crd::{LocalVolumeDiscoveryResult, LocalVolumeDiscoveryStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Block Devices
// =============================================================================

/// Kernel state of a device that must never be reported
pub const STATE_SUSPENDED: &str = "suspended";

/// A block device as reported by the node's device listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDevice {
    /// Device name (e.g., sdb, mpatha)
    pub name: String,
    /// Kernel device name (e.g., sdb, dm-0)
    pub kname: String,
    /// lsblk device type (disk, part, mpath, ...)
    pub device_type: String,
    pub model: String,
    pub vendor: String,
    pub serial: String,
    /// Size in bytes
    pub size: i64,
    /// None when the listing did not report a usable value
    pub rotational: Option<bool>,
    /// None when the listing did not report a usable value
    pub read_only: Option<bool>,
    pub removable: Option<bool>,
    pub state: String,
    pub part_label: String,
    pub fs_type: String,
    pub wwn: String,
    /// Kernel names of the devices nested under this one
    pub children: Vec<String>,
}

impl BlockDevice {
    /// Path of the device node under /dev
    pub fn dev_path(&self) -> Result<String> {
        if self.kname.is_empty() {
            return Err(Error::DeviceProbe {
                device: self.name.clone(),
                reason: "empty kernel name".into(),
            });
        }
        Ok(format!("/dev/{}", self.kname))
    }

    /// Read-only flag, failing when it could not be parsed
    pub fn is_read_only(&self) -> Result<bool> {
        self.read_only.ok_or_else(|| Error::DeviceProbe {
            device: self.name.clone(),
            reason: "unparsable read-only flag".into(),
        })
    }

    /// Whether the partition label marks a BIOS boot partition
    pub fn has_bios_boot_label(&self) -> bool {
        let label = self.part_label.to_lowercase();
        label.contains("bios") && label.contains("boot")
    }
}

// =============================================================================
// Events
// =============================================================================

/// Reasons attached to discovery events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventReason {
    ErrorCreatingDiscoveryResultObject,
    ErrorUpdatingDiscoveryResultObject,
    ErrorListingBlockDevices,
    UpdatedDiscoveredDeviceList,
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventReason::ErrorCreatingDiscoveryResultObject => {
                write!(f, "ErrorCreatingDiscoveryResultObject")
            }
            EventReason::ErrorUpdatingDiscoveryResultObject => {
                write!(f, "ErrorUpdatingDiscoveryResultObject")
            }
            EventReason::ErrorListingBlockDevices => write!(f, "ErrorListingBlockDevices"),
            EventReason::UpdatedDiscoveredDeviceList => write!(f, "UpdatedDiscoveredDeviceList"),
        }
    }
}

/// Kubernetes event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiskEventType {
    Normal,
    Warning,
}

impl std::fmt::Display for DiskEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskEventType::Normal => write!(f, "Normal"),
            DiskEventType::Warning => write!(f, "Warning"),
        }
    }
}

/// An operational event about discovery on this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskEvent {
    pub reason: EventReason,
    pub event_type: DiskEventType,
    pub message: String,
    /// Disk the event is about, empty for node-wide events
    pub disk: String,
}

impl DiskEvent {
    /// Warning event
    pub fn warning(reason: EventReason, message: impl Into<String>, disk: impl Into<String>) -> Self {
        Self {
            reason,
            event_type: DiskEventType::Warning,
            message: message.into(),
            disk: disk.into(),
        }
    }

    /// Normal event
    pub fn success(reason: EventReason, message: impl Into<String>, disk: impl Into<String>) -> Self {
        Self {
            reason,
            event_type: DiskEventType::Normal,
            message: message.into(),
            disk: disk.into(),
        }
    }

    /// Identity used to suppress repeated events
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.reason, self.event_type, self.disk)
    }
}

// =============================================================================
// Cluster Types
// =============================================================================

/// Node name and labels, as seen by selector matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Scheduling counts of the discovery DaemonSet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonSetCounts {
    pub desired: i32,
    pub ready: i32,
}

/// A Storage Scale LocalDisk to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDiskRequest {
    pub name: String,
    pub namespace: String,
    pub device: String,
    pub node: String,
    pub labels: BTreeMap<String, String>,
}

/// A Storage Scale Filesystem to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemRequest {
    pub name: String,
    pub namespace: String,
    pub disks: Vec<String>,
    pub replication: String,
    pub filesystem_type: String,
}

/// A StorageClass bound to a Storage Scale filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageClassRequest {
    pub name: String,
    pub provisioner: String,
    pub parameters: BTreeMap<String, String>,
}

/// Metadata of an existing Filesystem resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemObject {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

// =============================================================================
// Discovery Ports
// =============================================================================

/// Lists the block devices present on the node
#[async_trait]
pub trait BlockDeviceLister: Send + Sync {
    /// Flattened list of block devices, parents before children
    async fn list_block_devices(&self) -> Result<Vec<BlockDevice>>;
}

/// Host checks used to decide whether a device is free
pub trait DeviceProbe: Send + Sync {
    /// Persistent /dev/disk/by-id path of the device
    fn path_by_id(&self, device: &BlockDevice) -> Result<String>;

    /// Whether the device can be opened with O_EXCL
    fn can_open_exclusively(&self, device: &BlockDevice) -> Result<bool>;

    /// Mount point of a bind mount of the device, if any
    fn bind_mount(&self, device: &BlockDevice) -> Result<Option<String>>;
}

/// Storage of the per-node discovery result
#[async_trait]
pub trait DiscoveryResultStore: Send + Sync {
    async fn get_result(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolumeDiscoveryResult>>;

    async fn create_result(&self, result: &LocalVolumeDiscoveryResult) -> Result<()>;

    async fn update_result_status(&self, result: &LocalVolumeDiscoveryResult) -> Result<()>;
}

/// Destination of operational events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &DiskEvent) -> Result<()>;
}

/// Cluster reads and writes used by the discovery reconciler
#[async_trait]
pub trait DiscoveryClusterView: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>>;

    async fn list_results(&self, namespace: &str) -> Result<Vec<LocalVolumeDiscoveryResult>>;

    async fn delete_result(&self, namespace: &str, name: &str) -> Result<()>;

    /// None when the DaemonSet does not exist
    async fn daemonset_counts(&self, namespace: &str, name: &str)
        -> Result<Option<DaemonSetCounts>>;

    async fn update_discovery_status(
        &self,
        namespace: &str,
        name: &str,
        status: &LocalVolumeDiscoveryStatus,
    ) -> Result<()>;
}

// =============================================================================
// Provisioning Port
// =============================================================================

/// Cluster operations performed by the filesystem job
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    async fn create_local_disk(&self, request: &LocalDiskRequest) -> Result<()>;

    async fn create_filesystem(&self, request: &FilesystemRequest) -> Result<()>;

    async fn create_storage_class(&self, request: &StorageClassRequest) -> Result<()>;

    /// None when the Filesystem does not exist
    async fn get_filesystem(&self, namespace: &str, name: &str)
        -> Result<Option<FilesystemObject>>;

    /// Add a label to the Filesystem with a full object update
    async fn label_filesystem(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    async fn delete_filesystem(&self, namespace: &str, name: &str) -> Result<()>;

    async fn delete_storage_class(&self, name: &str) -> Result<()>;

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;

    /// Merge annotations into the Job's metadata
    async fn annotate_job(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()>;
}

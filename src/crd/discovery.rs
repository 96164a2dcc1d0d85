//! Device Discovery CRDs
//!
//! `LocalVolumeDiscovery` selects the nodes that run the discovery agent,
//! and each agent owns one `LocalVolumeDiscoveryResult` carrying the
//! devices it found on its node.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group shared by the discovery resources
pub const DISCOVERY_GROUP: &str = "fusion.storage.openshift.io";

/// API version shared by the discovery resources
pub const DISCOVERY_VERSION: &str = "v1alpha1";

/// Label carrying the node a discovery result belongs to
pub const DISCOVERY_RESULT_NODE_LABEL: &str = "discovery-result-node";

// =============================================================================
// LocalVolumeDiscovery CRD
// =============================================================================

/// LocalVolumeDiscovery asks the operator to run device discovery on the
/// nodes matched by its node selector.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fusion.storage.openshift.io",
    version = "v1alpha1",
    kind = "LocalVolumeDiscovery",
    plural = "localvolumediscoveries",
    shortname = "lvd",
    status = "LocalVolumeDiscoveryStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeDiscoverySpec {
    /// Nodes on which discovery runs; all nodes when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<NodeSelector>,
}

// =============================================================================
// Node Selection
// =============================================================================

/// Node selector, serialized like the core `v1.NodeSelector`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    /// Terms are ORed
    #[serde(default)]
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

/// A single selector term; all requirements within a term are ANDed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    /// Requirements on node labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<NodeSelectorRequirement>,

    /// Requirements on node fields (only `metadata.name` is supported)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_fields: Vec<NodeSelectorRequirement>,
}

/// A key, an operator and a set of values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Selector operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

impl std::fmt::Display for NodeSelectorOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeSelectorOperator::In => write!(f, "In"),
            NodeSelectorOperator::NotIn => write!(f, "NotIn"),
            NodeSelectorOperator::Exists => write!(f, "Exists"),
            NodeSelectorOperator::DoesNotExist => write!(f, "DoesNotExist"),
            NodeSelectorOperator::Gt => write!(f, "Gt"),
            NodeSelectorOperator::Lt => write!(f, "Lt"),
        }
    }
}

// =============================================================================
// LocalVolumeDiscovery Status
// =============================================================================

/// Status of the LocalVolumeDiscovery
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeDiscoveryStatus {
    /// Current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DiscoveryPhase>,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<DiscoveryCondition>,

    /// Generation last handled by the reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl LocalVolumeDiscoveryStatus {
    /// Set a condition, replacing any existing condition of the same type
    pub fn set_condition(&mut self, condition: DiscoveryCondition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            // keep the transition time when nothing changed
            if existing.status == condition.status {
                let since = existing.last_transition_time;
                *existing = condition;
                existing.last_transition_time = since;
            } else {
                *existing = condition;
            }
        } else {
            self.conditions.push(condition);
        }
    }
}

/// Discovery lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DiscoveryPhase {
    Discovering,
    DiscoveryFailed,
}

impl std::fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryPhase::Discovering => write!(f, "Discovering"),
            DiscoveryPhase::DiscoveryFailed => write!(f, "DiscoveryFailed"),
        }
    }
}

/// Discovery condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryCondition {
    /// Type of condition
    pub r#type: String,
    /// Status: True, False, Unknown
    pub status: String,
    /// Last transition time
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Message
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// LocalVolumeDiscoveryResult CRD
// =============================================================================

/// Per-node record of the devices found by the discovery agent.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fusion.storage.openshift.io",
    version = "v1alpha1",
    kind = "LocalVolumeDiscoveryResult",
    plural = "localvolumediscoveryresults",
    shortname = "lvdr",
    status = "LocalVolumeDiscoveryResultStatus",
    printcolumn = r#"{"name": "Node", "type": "string", "jsonPath": ".spec.nodeName"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeDiscoveryResultSpec {
    /// Name of the node the devices were found on
    pub node_name: String,
}

/// Status of a LocalVolumeDiscoveryResult
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalVolumeDiscoveryResultStatus {
    /// Devices found by the last scan that changed the list
    #[serde(default)]
    pub discovered_devices: Vec<DiscoveredDevice>,

    /// RFC 3339 time of the last update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_time_stamp: Option<String>,
}

// =============================================================================
// Discovered Devices
// =============================================================================

/// A block device reported by discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DiscoveredDevice {
    /// Persistent `/dev/disk/by-id` path, empty when none exists
    #[serde(rename = "deviceID", default)]
    pub device_id: String,
    pub path: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub serial: String,
    /// Size in bytes
    #[serde(default)]
    pub size: i64,
    pub property: DeviceMechanicalProperty,
    #[serde(rename = "fstype", default)]
    pub fs_type: String,
    pub status: DeviceStatus,
    #[serde(rename = "WWN", default)]
    pub wwn: String,
}

/// Kind of block device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum DeviceType {
    #[serde(rename = "disk")]
    Disk,
    #[serde(rename = "part")]
    Part,
    #[serde(rename = "loop")]
    Loop,
    #[serde(rename = "lvm")]
    Lvm,
    #[serde(rename = "mpath")]
    Mpath,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl DeviceType {
    /// Parse an lsblk `TYPE` column value
    pub fn from_lsblk(value: &str) -> Self {
        match value {
            "disk" => DeviceType::Disk,
            "part" => DeviceType::Part,
            "loop" => DeviceType::Loop,
            "lvm" => DeviceType::Lvm,
            "mpath" => DeviceType::Mpath,
            _ => DeviceType::Unknown,
        }
    }

    /// Whether discovery reports devices of this type
    pub fn is_supported(&self) -> bool {
        matches!(self, DeviceType::Disk | DeviceType::Mpath)
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Disk => write!(f, "disk"),
            DeviceType::Part => write!(f, "part"),
            DeviceType::Loop => write!(f, "loop"),
            DeviceType::Lvm => write!(f, "lvm"),
            DeviceType::Mpath => write!(f, "mpath"),
            DeviceType::Unknown => write!(f, ""),
        }
    }
}

/// Whether the device spins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeviceMechanicalProperty {
    Rotational,
    NonRotational,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl DeviceMechanicalProperty {
    pub fn from_rotational(rotational: Option<bool>) -> Self {
        match rotational {
            Some(true) => DeviceMechanicalProperty::Rotational,
            Some(false) => DeviceMechanicalProperty::NonRotational,
            None => DeviceMechanicalProperty::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceMechanicalProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceMechanicalProperty::Rotational => write!(f, "Rotational"),
            DeviceMechanicalProperty::NonRotational => write!(f, "NonRotational"),
            DeviceMechanicalProperty::Unknown => write!(f, ""),
        }
    }
}

/// Availability of a discovered device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceStatus {
    pub state: DeviceState,
}

impl From<DeviceState> for DeviceStatus {
    fn from(state: DeviceState) -> Self {
        Self { state }
    }
}

/// Device availability state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeviceState {
    Available,
    NotAvailable,
    #[default]
    Unknown,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Available => write!(f, "Available"),
            DeviceState::NotAvailable => write!(f, "NotAvailable"),
            DeviceState::Unknown => write!(f, "Unknown"),
        }
    }
}

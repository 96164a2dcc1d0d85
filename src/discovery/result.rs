//! Discovery Result Sync
//!
//! Keeps the node's `LocalVolumeDiscoveryResult` in place and writes the
//! discovered device list into its status.

use crate::crd::{
    DiscoveredDevice, LocalVolumeDiscovery, LocalVolumeDiscoveryResult,
    LocalVolumeDiscoveryResultSpec, LocalVolumeDiscoveryResultStatus,
    DISCOVERY_RESULT_NODE_LABEL,
};
use crate::domain::ports::DiscoveryResultStore;
use crate::error::{Error, Result};
use chrono::{SecondsFormat, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::info;

/// Prefix of every discovery result name
pub const DISCOVERY_RESULT_PREFIX: &str = "discovery-result-";

/// Longest name the API server accepts for the result
pub const MAX_RESULT_NAME_LENGTH: usize = 253;

/// Name of the result object for a node.
///
/// Names that would exceed the object name limit use the first 16 bytes
/// of the SHA-256 of the node name, hex encoded.
pub fn result_name(node_name: &str) -> String {
    let name = format!("{}{}", DISCOVERY_RESULT_PREFIX, node_name);
    if name.len() <= MAX_RESULT_NAME_LENGTH {
        return name;
    }

    let digest = Sha256::digest(node_name.as_bytes());
    let mut hash = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(hash, "{:02x}", byte);
    }
    format!("{}{}", DISCOVERY_RESULT_PREFIX, hash)
}

/// Build a new result object owned by the parent discovery object
pub fn new_result_instance(
    node_name: &str,
    namespace: &str,
    parent_name: &str,
    parent_uid: &str,
) -> LocalVolumeDiscoveryResult {
    let mut result = LocalVolumeDiscoveryResult::new(
        &result_name(node_name),
        LocalVolumeDiscoveryResultSpec {
            node_name: node_name.to_string(),
        },
    );
    result.metadata.namespace = Some(namespace.to_string());
    result.metadata.labels = Some(BTreeMap::from([(
        DISCOVERY_RESULT_NODE_LABEL.to_string(),
        node_name.to_string(),
    )]));
    result.metadata.owner_references = Some(vec![OwnerReference {
        api_version: LocalVolumeDiscovery::api_version(&()).to_string(),
        kind: LocalVolumeDiscovery::kind(&()).to_string(),
        name: parent_name.to_string(),
        uid: parent_uid.to_string(),
        ..Default::default()
    }]);
    result
}

// =============================================================================
// Result Sync
// =============================================================================

/// Identity of the node agent and its parent discovery object
#[derive(Debug, Clone)]
pub struct ResultIdentity {
    pub node_name: String,
    pub namespace: String,
    pub parent_name: String,
    pub parent_uid: String,
}

/// Reads and writes this node's discovery result
pub struct DiscoveryResultSync {
    store: Arc<dyn DiscoveryResultStore>,
    identity: ResultIdentity,
}

impl DiscoveryResultSync {
    pub fn new(store: Arc<dyn DiscoveryResultStore>, identity: ResultIdentity) -> Self {
        Self { store, identity }
    }

    pub fn name(&self) -> String {
        result_name(&self.identity.node_name)
    }

    /// Create the result object unless it already exists
    pub async fn ensure(&self) -> Result<()> {
        let name = self.name();
        if self
            .store
            .get_result(&self.identity.namespace, &name)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let result = new_result_instance(
            &self.identity.node_name,
            &self.identity.namespace,
            &self.identity.parent_name,
            &self.identity.parent_uid,
        );
        self.store.create_result(&result).await?;
        info!("created LocalVolumeDiscoveryResult {}", name);
        Ok(())
    }

    /// Replace the device list in the result status
    pub async fn update_status(&self, devices: &[DiscoveredDevice]) -> Result<()> {
        let name = self.name();
        let mut result = self
            .store
            .get_result(&self.identity.namespace, &name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "LocalVolumeDiscoveryResult".into(),
                name: name.clone(),
            })?;

        result.status = Some(LocalVolumeDiscoveryResultStatus {
            discovered_devices: devices.to_vec(),
            discovered_time_stamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        });
        self.store.update_result_status(&result).await?;
        info!(
            "updated LocalVolumeDiscoveryResult {} with {} devices",
            name,
            devices.len()
        );
        Ok(())
    }
}

//! Custom Resource Definitions for device discovery
//!
//! This module contains the CRD types owned by the operator:
//! - LocalVolumeDiscovery: selects the nodes that run discovery
//! - LocalVolumeDiscoveryResult: devices found on one node

pub mod discovery;

pub use discovery::*;

use kube::CustomResourceExt;

/// Render the operator's CRDs as a multi-document YAML stream
pub fn crd_manifests() -> crate::Result<String> {
    let mut out = String::new();
    for crd in [LocalVolumeDiscovery::crd(), LocalVolumeDiscoveryResult::crd()] {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}

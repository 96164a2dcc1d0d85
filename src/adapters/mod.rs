//! Adapters
//!
//! Implementations of the domain ports against the Kubernetes API server.

pub mod discovery;
pub mod provisioning;

pub use discovery::{discovery_object_reference, KubeClusterView, KubeEventSink, KubeResultStore};
pub use provisioning::KubeProvisioningClient;

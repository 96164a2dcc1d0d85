//! Kubernetes adapters for the discovery ports.

use crate::crd::{LocalVolumeDiscovery, LocalVolumeDiscoveryResult, LocalVolumeDiscoveryStatus};
use crate::domain::ports::{
    DaemonSetCounts, DiscoveryClusterView, DiscoveryResultStore, DiskEvent, DiskEventType,
    EventSink, NodeInfo,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, ObjectReference};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Controller name reported on discovery events
pub const EVENT_REPORTER: &str = "auto-discover-devices";

const EVENT_ACTION: &str = "Discovery";

// =============================================================================
// Discovery Results
// =============================================================================

/// `LocalVolumeDiscoveryResult` storage backed by the API server
pub struct KubeResultStore {
    client: Client,
}

impl KubeResultStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<LocalVolumeDiscoveryResult> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl DiscoveryResultStore for KubeResultStore {
    async fn get_result(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolumeDiscoveryResult>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create_result(&self, result: &LocalVolumeDiscoveryResult) -> Result<()> {
        let namespace = result.namespace().unwrap_or_default();
        self.api(&namespace)
            .create(&PostParams::default(), result)
            .await?;
        Ok(())
    }

    async fn update_result_status(&self, result: &LocalVolumeDiscoveryResult) -> Result<()> {
        let namespace = result.namespace().unwrap_or_default();
        let patch = json!({ "status": result.status });
        self.api(&namespace)
            .patch_status(&result.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Events
// =============================================================================

/// Reference to the parent discovery object that events are attached to
pub fn discovery_object_reference(name: &str, namespace: &str, uid: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some(LocalVolumeDiscovery::api_version(&()).to_string()),
        kind: Some(LocalVolumeDiscovery::kind(&()).to_string()),
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(uid.to_string()),
        ..Default::default()
    }
}

/// Publishes discovery events as Kubernetes events
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: Client, node_name: &str, reference: ObjectReference) -> Self {
        let reporter = Reporter {
            controller: EVENT_REPORTER.into(),
            instance: Some(node_name.to_string()),
        };
        Self {
            recorder: Recorder::new(client, reporter, reference),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, event: &DiskEvent) -> Result<()> {
        let type_ = match event.event_type {
            DiskEventType::Normal => EventType::Normal,
            DiskEventType::Warning => EventType::Warning,
        };
        self.recorder
            .publish(Event {
                type_,
                reason: event.reason.to_string(),
                note: Some(event.message.clone()),
                action: EVENT_ACTION.into(),
                secondary: None,
            })
            .await?;
        Ok(())
    }
}

// =============================================================================
// Cluster View
// =============================================================================

/// Cluster reads and writes of the discovery reconciler
pub struct KubeClusterView {
    client: Client,
}

impl KubeClusterView {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscoveryClusterView for KubeClusterView {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .map(|node| NodeInfo {
                name: node.name_any(),
                labels: node.labels().clone(),
            })
            .collect())
    }

    async fn list_results(&self, namespace: &str) -> Result<Vec<LocalVolumeDiscoveryResult>> {
        let api: Api<LocalVolumeDiscoveryResult> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn delete_result(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<LocalVolumeDiscoveryResult> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = Error::from(e);
                if err.is_not_found() {
                    debug!("discovery result {} already deleted", name);
                    return Ok(());
                }
                Err(err)
            }
        }
    }

    async fn daemonset_counts(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DaemonSetCounts>> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|ds| {
            let status = ds.status.unwrap_or_default();
            DaemonSetCounts {
                desired: status.desired_number_scheduled,
                ready: status.number_ready,
            }
        }))
    }

    async fn update_discovery_status(
        &self,
        namespace: &str,
        name: &str,
        status: &LocalVolumeDiscoveryStatus,
    ) -> Result<()> {
        let api: Api<LocalVolumeDiscovery> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_object_reference() {
        let reference = discovery_object_reference("auto-discover-devices", "ns", "uid-1");
        assert_eq!(
            reference.api_version.as_deref(),
            Some("fusion.storage.openshift.io/v1alpha1")
        );
        assert_eq!(reference.kind.as_deref(), Some("LocalVolumeDiscovery"));
        assert_eq!(reference.uid.as_deref(), Some("uid-1"));
    }
}

//! Kubernetes adapter for the filesystem job.
//!
//! LocalDisk and Filesystem are Storage Scale resources without Rust types
//! here, so they go through the dynamic API.

use crate::domain::ports::{
    FilesystemObject, FilesystemRequest, LocalDiskRequest, ProvisioningClient,
    StorageClassRequest,
};
use crate::error::{Error, Result};
use crate::provisioning::resources::{
    FILESYSTEM_KIND, LOCAL_DISK_KIND, SCALE_API_GROUP, SCALE_API_VERSION,
};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams,
    PostParams,
};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn scale_resource(kind: &str) -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        SCALE_API_GROUP,
        SCALE_API_VERSION,
        kind,
    ))
}

/// Body of a LocalDisk object
pub fn local_disk_object(request: &LocalDiskRequest) -> DynamicObject {
    let mut disk = DynamicObject::new(&request.name, &scale_resource(LOCAL_DISK_KIND))
        .within(&request.namespace)
        .data(json!({
            "spec": {
                "device": request.device,
                "node": request.node,
            }
        }));
    disk.metadata.labels = Some(request.labels.clone());
    disk
}

/// Body of a Filesystem object with a single local pool
pub fn filesystem_object(request: &FilesystemRequest) -> DynamicObject {
    DynamicObject::new(&request.name, &scale_resource(FILESYSTEM_KIND))
        .within(&request.namespace)
        .data(json!({
            "spec": {
                "local": {
                    "pools": [{ "disks": request.disks }],
                    "replication": request.replication,
                    "type": request.filesystem_type,
                }
            }
        }))
}

/// Cluster operations of the filesystem job, backed by the API server
pub struct KubeProvisioningClient {
    client: Client,
}

impl KubeProvisioningClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn scale_api(&self, namespace: &str, kind: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &scale_resource(kind))
    }

    fn storage_classes(&self) -> Api<StorageClass> {
        Api::all(self.client.clone())
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ProvisioningClient for KubeProvisioningClient {
    async fn create_local_disk(&self, request: &LocalDiskRequest) -> Result<()> {
        self.scale_api(&request.namespace, LOCAL_DISK_KIND)
            .create(&PostParams::default(), &local_disk_object(request))
            .await?;
        Ok(())
    }

    async fn create_filesystem(&self, request: &FilesystemRequest) -> Result<()> {
        self.scale_api(&request.namespace, FILESYSTEM_KIND)
            .create(&PostParams::default(), &filesystem_object(request))
            .await?;
        Ok(())
    }

    async fn create_storage_class(&self, request: &StorageClassRequest) -> Result<()> {
        let storage_class = StorageClass {
            metadata: ObjectMeta {
                name: Some(request.name.clone()),
                ..Default::default()
            },
            provisioner: request.provisioner.clone(),
            parameters: Some(request.parameters.clone()),
            ..Default::default()
        };
        self.storage_classes()
            .create(&PostParams::default(), &storage_class)
            .await?;
        Ok(())
    }

    async fn get_filesystem(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FilesystemObject>> {
        Ok(self
            .scale_api(namespace, FILESYSTEM_KIND)
            .get_opt(name)
            .await?
            .map(|fs| FilesystemObject {
                name: fs.name_any(),
                namespace: fs.namespace().unwrap_or_default(),
                labels: fs.labels().clone(),
            }))
    }

    async fn label_filesystem(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let api = self.scale_api(namespace, FILESYSTEM_KIND);
        let mut filesystem = api.get_opt(name).await?.ok_or_else(|| Error::ResourceNotFound {
            kind: FILESYSTEM_KIND.into(),
            name: name.to_string(),
        })?;
        filesystem
            .labels_mut()
            .insert(key.to_string(), value.to_string());
        api.replace(name, &PostParams::default(), &filesystem).await?;
        Ok(())
    }

    async fn delete_filesystem(&self, namespace: &str, name: &str) -> Result<()> {
        self.scale_api(namespace, FILESYSTEM_KIND)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn delete_storage_class(&self, name: &str) -> Result<()> {
        self.storage_classes()
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        // background propagation removes the job's pods too
        self.jobs(namespace)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn annotate_job(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()> {
        let patch: Value = json!({ "metadata": { "annotations": annotations } });
        self.jobs(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

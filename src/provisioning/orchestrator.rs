//! Filesystem Job Orchestrator
//!
//! Runs one filesystem job operation against the cluster. Creation walks
//! LocalDisks, Filesystem and StorageClass in order and checkpoints every
//! step into the Job's annotations; cleanup and deletion undo what a
//! checkpoint or the cluster says exists. LocalDisks are never deleted:
//! they stay behind for reuse by a later run.

use crate::domain::ports::ProvisioningClient;
use crate::error::{Error, Result};
use crate::provisioning::job::{
    CleanupFailedJobRequest, CleanupFilesystemRequest, CreateFilesystemRequest,
    FilesystemTarget, JobRef, JobRequest,
};
use crate::provisioning::phase::{CreatedResources, Phase, ProvisioningState};
use crate::provisioning::resources::{
    filesystem_request, local_disk_request, storage_class_request, ALLOW_DELETE_LABEL,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Executes filesystem job operations
pub struct FilesystemJob {
    client: Arc<dyn ProvisioningClient>,
}

impl FilesystemJob {
    pub fn new(client: Arc<dyn ProvisioningClient>) -> Self {
        Self { client }
    }

    /// Run the requested operation to completion or to its first fatal error
    pub async fn run(&self, request: JobRequest) -> Result<()> {
        let operation = request.operation();
        info!("running filesystem job operation {}", operation);

        match request {
            JobRequest::CreateFilesystem(req) => self.create_filesystem(&req).await.map(|_| ()),
            JobRequest::CleanupFailedJob(req) => self.cleanup_failed_job(&req).await,
            JobRequest::CleanupFilesystem(req) => self.cleanup_filesystem(&req).await,
            JobRequest::DeleteFilesystem(target) => self.delete_filesystem(&target).await,
        }?;

        info!("operation {} completed successfully", operation);
        Ok(())
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create LocalDisks for the new LUNs, then the Filesystem and its
    /// StorageClass. Returns the final checkpoint.
    pub async fn create_filesystem(
        &self,
        req: &CreateFilesystemRequest,
    ) -> Result<CreatedResources> {
        let fs = &req.filesystem_name;
        info!(
            "creating filesystem {} with {} new LUNs and {} reused LUNs",
            fs,
            req.new_luns.len(),
            req.reused_luns.len()
        );

        let mut state = ProvisioningState::start(format!("Starting creation of filesystem {}", fs));
        self.record(&req.job, &state).await;

        // Step 1: LocalDisks for new LUNs
        state.advance(
            Phase::CreatingLocalDisks,
            format!("Creating {} new LocalDisk resources", req.new_luns.len()),
        )?;
        self.record(&req.job, &state).await;

        for (i, lun) in req.new_luns.iter().enumerate() {
            let disk = local_disk_request(lun, fs, &req.namespace);
            info!(
                "creating LocalDisk {}/{}: {}",
                i + 1,
                req.new_luns.len(),
                disk.name
            );
            if let Err(e) = self.client.create_local_disk(&disk).await {
                let err = Error::provisioning(format!("failed to create LocalDisk {}", disk.name), e);
                return Err(self
                    .fail(&req.job, &mut state, "Failed to create LocalDisks", err)
                    .await);
            }
            state.created_mut().local_disks.push(disk.name);
        }

        for lun in &req.reused_luns {
            let name = lun.local_disk_name.clone().unwrap_or_default();
            info!("reusing existing LocalDisk {}", name);
            state.created_mut().local_disks.push(name);
        }

        let disks = state.created().local_disks.clone();

        // Step 2: Filesystem over every LocalDisk
        state.advance(
            Phase::CreatingFilesystem,
            format!("Creating FileSystem {} with {} LocalDisks", fs, disks.len()),
        )?;
        self.record(&req.job, &state).await;

        let request = filesystem_request(fs, &req.namespace, disks);
        if let Err(e) = self.client.create_filesystem(&request).await {
            let err = Error::provisioning(format!("failed to create FileSystem {}", fs), e);
            return Err(self
                .fail(
                    &req.job,
                    &mut state,
                    "Failed to create FileSystem - LocalDisks have been preserved for reuse",
                    err,
                )
                .await);
        }
        state.created_mut().file_system = Some(fs.clone());
        info!("created FileSystem {}", fs);

        // Step 3: StorageClass
        state.advance(
            Phase::CreatingStorageClass,
            format!("Creating StorageClass {}", fs),
        )?;
        self.record(&req.job, &state).await;

        if let Err(e) = self.client.create_storage_class(&storage_class_request(fs)).await {
            let err = Error::provisioning(format!("failed to create StorageClass {}", fs), e);
            return Err(self
                .fail(
                    &req.job,
                    &mut state,
                    "FileSystem created successfully, but StorageClass creation failed",
                    err,
                )
                .await);
        }
        state.created_mut().storage_class = Some(fs.clone());
        info!("created StorageClass {}", fs);

        state.advance(
            Phase::Completed,
            format!("Successfully created filesystem {} with all components", fs),
        )?;
        self.record(&req.job, &state).await;

        Ok(state.created().clone())
    }

    async fn fail(
        &self,
        job: &JobRef,
        state: &mut ProvisioningState,
        message: &str,
        err: Error,
    ) -> Error {
        warn!("{}: {}", message, err);
        if let Err(e) = state.fail(message, &err) {
            warn!("{}", e);
        }
        self.record(job, state).await;
        err
    }

    /// Write the state to the Job's annotations, logging failures
    async fn record(&self, job: &JobRef, state: &ProvisioningState) {
        info!(
            "phase update: {} - {}",
            state.phase(),
            state.details().message
        );
        let annotations = match state.annotations() {
            Ok(a) => a,
            Err(e) => {
                warn!("failed to encode job phase: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .client
            .annotate_job(&job.namespace, &job.name, &annotations)
            .await
        {
            warn!("failed to update job phase: {}", e);
        }
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Remove what a failed creation left behind, newest first
    pub async fn cleanup_failed_job(&self, req: &CleanupFailedJobRequest) -> Result<()> {
        if let Some(job) = &req.failed_job {
            info!(
                "cleaning up failed job {} in namespace {}",
                job.name, job.namespace
            );
        }

        if let Some(sc) = &req.created.storage_class {
            self.delete_storage_class_best_effort(sc).await;
        }

        if let Some(fs) = &req.created.file_system {
            info!("removing FileSystem {}", fs);
            match self.client.delete_filesystem(&req.target_namespace, fs).await {
                Ok(()) => info!("deleted FileSystem {}", fs),
                Err(e) if e.is_not_found() => info!("FileSystem {} already deleted", fs),
                Err(e) => {
                    return Err(Error::provisioning(
                        format!("failed to delete FileSystem {}", fs),
                        e,
                    ))
                }
            }
        }

        if let Some(job) = &req.failed_job {
            self.delete_job_best_effort(job).await;
        }

        Ok(())
    }

    /// Remove the related failed Job, then delete the filesystem
    pub async fn cleanup_filesystem(&self, req: &CleanupFilesystemRequest) -> Result<()> {
        info!("cleaning up filesystem {}", req.target.name);
        if let Some(job) = &req.failed_job {
            self.delete_job_best_effort(job).await;
        }
        self.delete_filesystem(&req.target).await
    }

    /// Delete a Filesystem and its StorageClass. The Filesystem gets the
    /// allow-delete label first when it does not carry it yet.
    pub async fn delete_filesystem(&self, target: &FilesystemTarget) -> Result<()> {
        let (ns, name) = (&target.namespace, &target.name);
        info!("deleting filesystem {} in namespace {}", name, ns);

        let Some(filesystem) = self
            .client
            .get_filesystem(ns, name)
            .await
            .map_err(|e| Error::provisioning(format!("failed to get FileSystem {}", name), e))?
        else {
            info!("FileSystem {} not found, nothing to delete", name);
            return Ok(());
        };

        if !filesystem.labels.contains_key(ALLOW_DELETE_LABEL) {
            info!("adding deletion label to FileSystem {}", name);
            self.client
                .label_filesystem(ns, name, ALLOW_DELETE_LABEL, "")
                .await
                .map_err(|e| {
                    Error::provisioning(
                        format!("failed to add deletion label to FileSystem {}", name),
                        e,
                    )
                })?;
        }

        match self.client.delete_filesystem(ns, name).await {
            Ok(()) => info!("deleted FileSystem {}", name),
            Err(e) if e.is_not_found() => info!("FileSystem {} already deleted", name),
            Err(e) => {
                return Err(Error::provisioning(
                    format!("failed to delete FileSystem {}", name),
                    e,
                ))
            }
        }

        self.delete_storage_class_best_effort(name).await;
        Ok(())
    }

    async fn delete_storage_class_best_effort(&self, name: &str) {
        info!("removing StorageClass {}", name);
        match self.client.delete_storage_class(name).await {
            Ok(()) => info!("deleted StorageClass {}", name),
            Err(e) => warn!("failed to delete StorageClass {} (continuing): {}", name, e),
        }
    }

    async fn delete_job_best_effort(&self, job: &JobRef) {
        info!("removing failed Job {}", job.name);
        match self.client.delete_job(&job.namespace, &job.name).await {
            Ok(()) => info!("deleted failed Job {}", job.name),
            Err(e) => warn!("failed to delete Job {} (continuing): {}", job.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        FilesystemObject, FilesystemRequest, LocalDiskRequest, StorageClassRequest,
    };
    use crate::provisioning::job::LunSpec;
    use crate::provisioning::phase::{
        PhaseDetails, CREATED_RESOURCES_ANNOTATION, PHASE_ANNOTATION, PHASE_DETAILS_ANNOTATION,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashSet};

    const SCALE_NS: &str = "ibm-spectrum-scale";

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "injected".into(),
            reason: (if code == 404 { "NotFound" } else { "InternalError" }).into(),
            code,
        }))
    }

    /// Records every call in order and fails the operations named in `fail`
    #[derive(Default)]
    struct FakeClient {
        local_disks: Mutex<BTreeMap<String, LocalDiskRequest>>,
        filesystems: Mutex<BTreeMap<String, FilesystemObject>>,
        filesystem_creates: Mutex<Vec<FilesystemRequest>>,
        storage_classes: Mutex<Vec<StorageClassRequest>>,
        annotations: Mutex<Vec<BTreeMap<String, String>>>,
        calls: Mutex<Vec<String>>,
        fail: Mutex<HashSet<&'static str>>,
    }

    impl FakeClient {
        fn failing(ops: &[&'static str]) -> Self {
            let client = Self::default();
            client.fail.lock().extend(ops.iter().copied());
            client
        }

        fn call(&self, op: &'static str, name: &str) -> Result<()> {
            self.calls.lock().push(format!("{}:{}", op, name));
            if self.fail.lock().contains(op) {
                return Err(api_error(500));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn count(&self, op: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| c.split(':').next() == Some(op))
                .count()
        }

        fn add_filesystem(&self, name: &str, labels: &[(&str, &str)]) {
            self.filesystems.lock().insert(
                name.into(),
                FilesystemObject {
                    name: name.into(),
                    namespace: SCALE_NS.into(),
                    labels: labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
            );
        }

        fn last_details(&self) -> PhaseDetails {
            let annotations = self.annotations.lock();
            let last = annotations.last().unwrap();
            serde_json::from_str(&last[PHASE_DETAILS_ANNOTATION]).unwrap()
        }

        fn last_phase(&self) -> String {
            self.annotations.lock().last().unwrap()[PHASE_ANNOTATION].clone()
        }

        fn last_created(&self) -> CreatedResources {
            let annotations = self.annotations.lock();
            CreatedResources::from_json(&annotations.last().unwrap()[CREATED_RESOURCES_ANNOTATION])
                .unwrap()
        }
    }

    #[async_trait]
    impl ProvisioningClient for FakeClient {
        async fn create_local_disk(&self, request: &LocalDiskRequest) -> Result<()> {
            self.call("create-localdisk", &request.name)?;
            let mut disks = self.local_disks.lock();
            if disks.contains_key(&request.name) {
                return Err(Error::ResourceExists {
                    kind: "LocalDisk".into(),
                    name: request.name.clone(),
                });
            }
            disks.insert(request.name.clone(), request.clone());
            Ok(())
        }

        async fn create_filesystem(&self, request: &FilesystemRequest) -> Result<()> {
            self.call("create-filesystem", &request.name)?;
            self.filesystem_creates.lock().push(request.clone());
            self.add_filesystem(&request.name, &[]);
            Ok(())
        }

        async fn create_storage_class(&self, request: &StorageClassRequest) -> Result<()> {
            self.call("create-storageclass", &request.name)?;
            self.storage_classes.lock().push(request.clone());
            Ok(())
        }

        async fn get_filesystem(
            &self,
            _namespace: &str,
            name: &str,
        ) -> Result<Option<FilesystemObject>> {
            self.call("get-filesystem", name)?;
            Ok(self.filesystems.lock().get(name).cloned())
        }

        async fn label_filesystem(
            &self,
            _namespace: &str,
            name: &str,
            key: &str,
            value: &str,
        ) -> Result<()> {
            self.call("label-filesystem", name)?;
            if let Some(fs) = self.filesystems.lock().get_mut(name) {
                fs.labels.insert(key.into(), value.into());
            }
            Ok(())
        }

        async fn delete_filesystem(&self, _namespace: &str, name: &str) -> Result<()> {
            self.call("delete-filesystem", name)?;
            match self.filesystems.lock().remove(name) {
                Some(_) => Ok(()),
                None => Err(api_error(404)),
            }
        }

        async fn delete_storage_class(&self, name: &str) -> Result<()> {
            self.call("delete-storageclass", name)
        }

        async fn delete_job(&self, _namespace: &str, name: &str) -> Result<()> {
            self.call("delete-job", name)
        }

        async fn annotate_job(
            &self,
            _namespace: &str,
            name: &str,
            annotations: &BTreeMap<String, String>,
        ) -> Result<()> {
            self.call("annotate-job", name)?;
            self.annotations.lock().push(annotations.clone());
            Ok(())
        }
    }

    fn lun(dev: &str, wwn: &str) -> LunSpec {
        LunSpec {
            path: format!("/dev/{}", dev),
            wwn: wwn.into(),
            node: "worker-0".into(),
            ..Default::default()
        }
    }

    fn reused(name: &str) -> LunSpec {
        LunSpec {
            path: "/dev/sdz".into(),
            wwn: "0xz".into(),
            node: "worker-1".into(),
            is_reused: true,
            local_disk_name: Some(name.into()),
        }
    }

    fn create_request(new_luns: Vec<LunSpec>, reused_luns: Vec<LunSpec>) -> CreateFilesystemRequest {
        CreateFilesystemRequest {
            filesystem_name: "fs1".into(),
            namespace: SCALE_NS.into(),
            new_luns,
            reused_luns,
            job: JobRef {
                name: "create-fs1".into(),
                namespace: "ibm-fusion-access".into(),
            },
        }
    }

    fn job(client: &Arc<FakeClient>) -> FilesystemJob {
        FilesystemJob::new(client.clone())
    }

    // =========================================================================
    // create-filesystem
    // =========================================================================

    #[tokio::test]
    async fn test_create_two_new_luns() {
        let client = Arc::new(FakeClient::default());
        let req = create_request(vec![lun("sdb", "0xA1"), lun("sdc", "0xA2")], vec![]);

        let created = job(&client).create_filesystem(&req).await.unwrap();

        assert_eq!(client.count("create-localdisk"), 2);
        assert_eq!(client.count("create-filesystem"), 1);
        assert_eq!(client.count("create-storageclass"), 1);
        assert_eq!(
            client.filesystem_creates.lock()[0].disks,
            vec!["sdb-0xa1".to_string(), "sdc-0xa2".to_string()]
        );
        assert_eq!(created.file_system.as_deref(), Some("fs1"));
        assert_eq!(created.storage_class.as_deref(), Some("fs1"));

        let phases: Vec<String> = client
            .annotations
            .lock()
            .iter()
            .map(|a| a[PHASE_ANNOTATION].clone())
            .collect();
        assert_eq!(
            phases,
            [
                "starting",
                "creating-localdisks",
                "creating-filesystem",
                "creating-storageclass",
                "completed"
            ]
        );
        let details = client.last_details();
        assert_eq!(
            details.message,
            "Successfully created filesystem fs1 with all components"
        );
        assert_eq!(details.progress.as_deref(), Some("3/3"));
    }

    #[tokio::test]
    async fn test_reused_luns_join_the_pool() {
        let client = Arc::new(FakeClient::default());
        let req = create_request(vec![lun("sdb", "0xA1")], vec![reused("sdz-0xz")]);

        let created = job(&client).create_filesystem(&req).await.unwrap();

        assert_eq!(client.count("create-localdisk"), 1);
        assert_eq!(
            client.filesystem_creates.lock()[0].disks,
            vec!["sdb-0xa1".to_string(), "sdz-0xz".to_string()]
        );
        assert_eq!(created.local_disks, vec!["sdb-0xa1", "sdz-0xz"]);
    }

    #[tokio::test]
    async fn test_filesystem_failure_preserves_local_disks() {
        let client = Arc::new(FakeClient::failing(&["create-filesystem"]));
        let req = create_request(vec![lun("sdb", "0xA1"), lun("sdc", "0xA2")], vec![]);

        let err = job(&client).create_filesystem(&req).await.unwrap_err();
        assert!(err.to_string().contains("failed to create FileSystem fs1"));

        assert_eq!(client.local_disks.lock().len(), 2);
        assert_eq!(client.count("create-storageclass"), 0);
        assert_eq!(client.last_phase(), "failed");

        let details = client.last_details();
        assert_eq!(details.current_phase, "creating-filesystem");
        assert_eq!(
            details.message,
            "Failed to create FileSystem - LocalDisks have been preserved for reuse"
        );
        assert_eq!(details.progress.as_deref(), Some("2/3"));
        assert!(details.error.is_some());

        let created = client.last_created();
        assert_eq!(created.local_disks, vec!["sdb-0xa1", "sdc-0xa2"]);
        assert!(created.file_system.is_none());
    }

    #[tokio::test]
    async fn test_local_disk_failure_checkpoints_partial_progress() {
        let client = Arc::new(FakeClient::default());
        client.local_disks.lock().insert(
            "sdc-0xa2".into(),
            local_disk_request(&lun("sdc", "0xA2"), "old", SCALE_NS),
        );
        let req = create_request(vec![lun("sdb", "0xA1"), lun("sdc", "0xA2")], vec![]);

        let err = job(&client).create_filesystem(&req).await.unwrap_err();
        assert!(err.to_string().contains("failed to create LocalDisk sdc-0xa2"));
        assert_eq!(client.count("create-filesystem"), 0);

        let details = client.last_details();
        assert_eq!(details.current_phase, "creating-localdisks");
        assert_eq!(details.message, "Failed to create LocalDisks");
        assert_eq!(client.last_created().local_disks, vec!["sdb-0xa1"]);
    }

    #[tokio::test]
    async fn test_storage_class_failure() {
        let client = Arc::new(FakeClient::failing(&["create-storageclass"]));
        let req = create_request(vec![lun("sdb", "0xA1")], vec![]);

        assert!(job(&client).create_filesystem(&req).await.is_err());

        let details = client.last_details();
        assert_eq!(details.current_phase, "creating-storageclass");
        assert_eq!(
            details.message,
            "FileSystem created successfully, but StorageClass creation failed"
        );
        let created = client.last_created();
        assert_eq!(created.file_system.as_deref(), Some("fs1"));
        assert!(created.storage_class.is_none());
    }

    #[tokio::test]
    async fn test_annotation_failures_do_not_fail_the_job() {
        let client = Arc::new(FakeClient::failing(&["annotate-job"]));
        let req = create_request(vec![lun("sdb", "0xA1")], vec![]);

        job(&client).create_filesystem(&req).await.unwrap();
        assert_eq!(client.count("annotate-job"), 5);
        assert_eq!(client.count("create-storageclass"), 1);
    }

    // =========================================================================
    // cleanup-failed-job
    // =========================================================================

    fn cleanup_request(created: CreatedResources) -> CleanupFailedJobRequest {
        CleanupFailedJobRequest {
            target_namespace: SCALE_NS.into(),
            failed_job: Some(JobRef {
                name: "create-fs1".into(),
                namespace: "ibm-fusion-access".into(),
            }),
            created,
        }
    }

    #[tokio::test]
    async fn test_cleanup_with_only_local_disks() {
        let client = Arc::new(FakeClient::default());
        let created = CreatedResources {
            local_disks: vec!["sdb-0xa1".into()],
            ..Default::default()
        };

        job(&client)
            .cleanup_failed_job(&cleanup_request(created))
            .await
            .unwrap();

        assert_eq!(client.count("delete-filesystem"), 0);
        assert_eq!(client.count("delete-storageclass"), 0);
        assert_eq!(client.calls(), vec!["delete-job:create-fs1"]);
    }

    #[tokio::test]
    async fn test_cleanup_in_reverse_order() {
        let client = Arc::new(FakeClient::failing(&["delete-storageclass", "delete-job"]));
        client.add_filesystem("fs1", &[]);
        let created = CreatedResources {
            local_disks: vec!["sdb-0xa1".into()],
            file_system: Some("fs1".into()),
            storage_class: Some("fs1".into()),
        };

        job(&client)
            .cleanup_failed_job(&cleanup_request(created))
            .await
            .unwrap();

        assert_eq!(
            client.calls(),
            vec![
                "delete-storageclass:fs1",
                "delete-filesystem:fs1",
                "delete-job:create-fs1"
            ]
        );
    }

    #[tokio::test]
    async fn test_cleanup_filesystem_errors() {
        // not found counts as deleted
        let client = Arc::new(FakeClient::default());
        let created = CreatedResources {
            file_system: Some("fs1".into()),
            ..Default::default()
        };
        job(&client)
            .cleanup_failed_job(&cleanup_request(created.clone()))
            .await
            .unwrap();

        let client = Arc::new(FakeClient::failing(&["delete-filesystem"]));
        let err = job(&client)
            .cleanup_failed_job(&cleanup_request(created))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to delete FileSystem fs1"));
        assert_eq!(client.count("delete-job"), 0);
    }

    // =========================================================================
    // delete-filesystem / cleanup-filesystem
    // =========================================================================

    fn target() -> FilesystemTarget {
        FilesystemTarget {
            name: "fs1".into(),
            namespace: SCALE_NS.into(),
        }
    }

    #[tokio::test]
    async fn test_delete_adds_label_once() {
        let client = Arc::new(FakeClient::default());
        client.add_filesystem("fs1", &[("app", "scale")]);

        job(&client).delete_filesystem(&target()).await.unwrap();

        assert_eq!(
            client.calls(),
            vec![
                "get-filesystem:fs1",
                "label-filesystem:fs1",
                "delete-filesystem:fs1",
                "delete-storageclass:fs1"
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_already_labeled() {
        let client = Arc::new(FakeClient::failing(&["delete-storageclass"]));
        client.add_filesystem("fs1", &[(ALLOW_DELETE_LABEL, "")]);

        job(&client).delete_filesystem(&target()).await.unwrap();

        assert_eq!(client.count("label-filesystem"), 0);
        assert_eq!(client.count("delete-filesystem"), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let client = Arc::new(FakeClient::default());
        client.add_filesystem("fs1", &[]);

        job(&client).delete_filesystem(&target()).await.unwrap();
        job(&client).delete_filesystem(&target()).await.unwrap();

        assert_eq!(client.count("delete-filesystem"), 1);
    }

    #[tokio::test]
    async fn test_delete_label_failure_stops_delete() {
        let client = Arc::new(FakeClient::failing(&["label-filesystem"]));
        client.add_filesystem("fs1", &[]);

        assert!(job(&client).delete_filesystem(&target()).await.is_err());
        assert_eq!(client.count("delete-filesystem"), 0);
    }

    #[tokio::test]
    async fn test_cleanup_filesystem_removes_job_first() {
        let client = Arc::new(FakeClient::failing(&["delete-job"]));
        client.add_filesystem("fs1", &[]);
        let req = CleanupFilesystemRequest {
            target: target(),
            failed_job: Some(JobRef {
                name: "create-fs1".into(),
                namespace: "ibm-fusion-access".into(),
            }),
        };

        job(&client).run(JobRequest::CleanupFilesystem(req)).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls[0], "delete-job:create-fs1");
        assert!(calls.contains(&"delete-filesystem:fs1".to_string()));
    }

    // =========================================================================
    // LocalDisk accumulation
    // =========================================================================

    /// Nothing in the job deletes LocalDisks. Disks from a failed run stay
    /// in the cluster through every cleanup path and must be passed back as
    /// reused LUNs; resubmitting them as new LUNs fails on the existing names.
    #[tokio::test]
    async fn test_failed_runs_leave_local_disks_behind() {
        let client = Arc::new(FakeClient::failing(&["create-filesystem"]));
        let luns = vec![lun("sdb", "0xA1"), lun("sdc", "0xA2")];

        assert!(job(&client)
            .create_filesystem(&create_request(luns.clone(), vec![]))
            .await
            .is_err());
        let checkpoint = client.last_created();

        job(&client)
            .cleanup_failed_job(&cleanup_request(checkpoint))
            .await
            .unwrap();
        assert_eq!(client.local_disks.lock().len(), 2);

        client.fail.lock().clear();
        let err = job(&client)
            .create_filesystem(&create_request(luns, vec![]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sdb-0xa1"));
        assert_eq!(client.local_disks.lock().len(), 2);

        job(&client)
            .create_filesystem(&create_request(
                vec![],
                vec![reused("sdb-0xa1"), reused("sdc-0xa2")],
            ))
            .await
            .unwrap();

        job(&client).delete_filesystem(&target()).await.unwrap();
        assert_eq!(client.local_disks.lock().len(), 2);
    }
}

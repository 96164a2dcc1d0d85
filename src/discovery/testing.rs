//! In-memory port implementations shared by the discovery tests.

use crate::crd::{LocalVolumeDiscoveryResult, LocalVolumeDiscoveryStatus};
use crate::domain::ports::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn injected(what: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".into(),
        message: format!("injected {} failure", what),
        reason: "InternalError".into(),
        code: 500,
    }))
}

// =============================================================================
// Events
// =============================================================================

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DiskEvent>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<DiskEvent> {
        self.events.lock().clone()
    }

    pub fn reasons(&self) -> Vec<EventReason> {
        self.events.lock().iter().map(|e| e.reason).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &DiskEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(injected("event"));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// =============================================================================
// Block Devices
// =============================================================================

/// Returns queued listings in order, repeating the last one
#[derive(Default)]
pub struct ScriptedLister {
    listings: Mutex<VecDeque<Option<Vec<BlockDevice>>>>,
    last: Mutex<Option<Vec<BlockDevice>>>,
    calls: AtomicUsize,
}

impl ScriptedLister {
    pub fn new(devices: Vec<BlockDevice>) -> Self {
        let lister = Self::default();
        lister.push(devices);
        lister
    }

    pub fn push(&self, devices: Vec<BlockDevice>) {
        self.listings.lock().push_back(Some(devices));
    }

    pub fn push_failure(&self) {
        self.listings.lock().push_back(None);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockDeviceLister for ScriptedLister {
    async fn list_block_devices(&self) -> Result<Vec<BlockDevice>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.listings.lock().pop_front();
        match next {
            Some(Some(devices)) => {
                *self.last.lock() = Some(devices.clone());
                Ok(devices)
            }
            Some(None) => Err(Error::BlockDeviceListing("lsblk exited with 1".into())),
            None => Ok(self.last.lock().clone().unwrap_or_default()),
        }
    }
}

/// Every device is free and has a by-id link named after it
pub struct FreeProbe;

impl DeviceProbe for FreeProbe {
    fn path_by_id(&self, device: &BlockDevice) -> Result<String> {
        Ok(format!("/dev/disk/by-id/wwn-{}", device.kname))
    }

    fn can_open_exclusively(&self, _device: &BlockDevice) -> Result<bool> {
        Ok(true)
    }

    fn bind_mount(&self, _device: &BlockDevice) -> Result<Option<String>> {
        Ok(None)
    }
}

pub fn disk(kname: &str) -> BlockDevice {
    BlockDevice {
        name: kname.into(),
        kname: kname.into(),
        device_type: "disk".into(),
        read_only: Some(false),
        rotational: Some(true),
        state: "running".into(),
        size: 100 << 30,
        wwn: format!("0x{}", kname),
        ..Default::default()
    }
}

// =============================================================================
// Discovery Results
// =============================================================================

#[derive(Default)]
pub struct MemoryResultStore {
    results: Mutex<BTreeMap<(String, String), LocalVolumeDiscoveryResult>>,
    pub fail_get: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryResultStore {
    pub fn insert(&self, result: LocalVolumeDiscoveryResult) {
        let key = (
            result.metadata.namespace.clone().unwrap_or_default(),
            result.metadata.name.clone().unwrap_or_default(),
        );
        self.results.lock().insert(key, result);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<LocalVolumeDiscoveryResult> {
        self.results
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryResultStore for MemoryResultStore {
    async fn get_result(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalVolumeDiscoveryResult>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        Ok(self.get(namespace, name))
    }

    async fn create_result(&self, result: &LocalVolumeDiscoveryResult) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("create"));
        }
        self.insert(result.clone());
        Ok(())
    }

    async fn update_result_status(&self, result: &LocalVolumeDiscoveryResult) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected("update"));
        }
        self.insert(result.clone());
        Ok(())
    }
}

// =============================================================================
// Cluster
// =============================================================================

#[derive(Default)]
pub struct FakeCluster {
    pub nodes: Mutex<Vec<NodeInfo>>,
    pub results: Mutex<Vec<LocalVolumeDiscoveryResult>>,
    pub daemonset: Mutex<Option<DaemonSetCounts>>,
    pub deleted: Mutex<Vec<String>>,
    pub statuses: Mutex<Vec<LocalVolumeDiscoveryStatus>>,
}

impl FakeCluster {
    pub fn add_node(&self, name: &str, labels: &[(&str, &str)]) {
        self.nodes.lock().push(NodeInfo {
            name: name.into(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl DiscoveryClusterView for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self.nodes.lock().clone())
    }

    async fn list_results(&self, namespace: &str) -> Result<Vec<LocalVolumeDiscoveryResult>> {
        Ok(self
            .results
            .lock()
            .iter()
            .filter(|r| r.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn delete_result(&self, namespace: &str, name: &str) -> Result<()> {
        self.results.lock().retain(|r| {
            !(r.metadata.namespace.as_deref() == Some(namespace)
                && r.metadata.name.as_deref() == Some(name))
        });
        self.deleted.lock().push(name.to_string());
        Ok(())
    }

    async fn daemonset_counts(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<DaemonSetCounts>> {
        Ok(*self.daemonset.lock())
    }

    async fn update_discovery_status(
        &self,
        _namespace: &str,
        _name: &str,
        status: &LocalVolumeDiscoveryStatus,
    ) -> Result<()> {
        self.statuses.lock().push(status.clone());
        Ok(())
    }
}

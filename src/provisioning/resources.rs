//! Storage Scale resources created by the filesystem job.

use crate::domain::ports::{FilesystemRequest, LocalDiskRequest, StorageClassRequest};
use crate::provisioning::job::LunSpec;
use std::collections::BTreeMap;

/// API group and version of the Storage Scale resources
pub const SCALE_API_GROUP: &str = "scale.spectrum.ibm.com";
pub const SCALE_API_VERSION: &str = "v1beta1";

pub const LOCAL_DISK_KIND: &str = "LocalDisk";
pub const FILESYSTEM_KIND: &str = "Filesystem";

/// CSI provisioner of Storage Scale volumes
pub const STORAGE_CLASS_PROVISIONER: &str = "spectrumscale.csi.ibm.com";

/// StorageClass parameter naming the backing filesystem
pub const VOL_BACKEND_FS_PARAMETER: &str = "volBackendFs";

/// Label Storage Scale requires on a Filesystem before it may be deleted
pub const ALLOW_DELETE_LABEL: &str = "scale.spectrum.ibm.com/allowDelete";

pub const FILESYSTEM_JOB_LABEL: &str = "fusion.storage.openshift.io/filesystem-job";
pub const FILESYSTEM_NAME_LABEL: &str = "fusion.storage.openshift.io/filesystem-name";

pub const FILESYSTEM_REPLICATION: &str = "1-way";
pub const FILESYSTEM_TYPE: &str = "shared";

/// Longest resource name produced for a LocalDisk
pub const MAX_RESOURCE_NAME_LENGTH: usize = 63;

/// LocalDisk name for a LUN: `<device basename>-<wwn>`, lowercased with
/// `_`, `:` and `/` replaced by `-`, cut to 63 characters without a
/// trailing separator.
pub fn local_disk_name(lun: &LunSpec) -> String {
    let device = lun.path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let name: String = format!("{}-{}", device, lun.wwn)
        .replace(['_', ':', '/'], "-")
        .to_lowercase()
        .chars()
        .take(MAX_RESOURCE_NAME_LENGTH)
        .collect();
    name.trim_end_matches(['-', '.']).to_string()
}

pub fn local_disk_request(lun: &LunSpec, filesystem: &str, namespace: &str) -> LocalDiskRequest {
    LocalDiskRequest {
        name: local_disk_name(lun),
        namespace: namespace.to_string(),
        device: lun.path.clone(),
        node: lun.node.clone(),
        labels: BTreeMap::from([
            (FILESYSTEM_JOB_LABEL.to_string(), "true".to_string()),
            (FILESYSTEM_NAME_LABEL.to_string(), filesystem.to_string()),
        ]),
    }
}

pub fn filesystem_request(name: &str, namespace: &str, disks: Vec<String>) -> FilesystemRequest {
    FilesystemRequest {
        name: name.to_string(),
        namespace: namespace.to_string(),
        disks,
        replication: FILESYSTEM_REPLICATION.to_string(),
        filesystem_type: FILESYSTEM_TYPE.to_string(),
    }
}

/// StorageClass named after the filesystem it serves
pub fn storage_class_request(filesystem: &str) -> StorageClassRequest {
    StorageClassRequest {
        name: filesystem.to_string(),
        provisioner: STORAGE_CLASS_PROVISIONER.to_string(),
        parameters: BTreeMap::from([(
            VOL_BACKEND_FS_PARAMETER.to_string(),
            filesystem.to_string(),
        )]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lun(path: &str, wwn: &str) -> LunSpec {
        LunSpec {
            path: path.into(),
            wwn: wwn.into(),
            node: "worker-0".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_local_disk_name() {
        assert_eq!(
            local_disk_name(&lun("/dev/sdb", "0x5000C500A1B2C3D4")),
            "sdb-0x5000c500a1b2c3d4"
        );
        assert_eq!(
            local_disk_name(&lun("/dev/mapper/mpath_a", "naa.600:a0b")),
            "mpath-a-naa.600-a0b"
        );
        assert_eq!(
            local_disk_name(&lun("/dev/disk/by-id/dm-name-x", "0x1/2")),
            "dm-name-x-0x1-2"
        );
        assert_eq!(local_disk_name(&lun("nvme0n1", "eui.1")), "nvme0n1-eui.1");

        let long = local_disk_name(&lun("/dev/sdb", &"A".repeat(80)));
        assert_eq!(long.len(), MAX_RESOURCE_NAME_LENGTH);
        assert!(long.starts_with("sdb-aaaa"));

        // a cut that lands on a separator drops it
        let wwn = format!("{}_b", "a".repeat(58));
        let cut = local_disk_name(&lun("/dev/sdb", &wwn));
        assert_eq!(cut, format!("sdb-{}", "a".repeat(58)));
        assert!(!cut.contains('/'));
    }

    #[test]
    fn test_requests() {
        let disk = local_disk_request(&lun("/dev/sdb", "0x1"), "fs1", "ibm-spectrum-scale");
        assert_eq!(disk.device, "/dev/sdb");
        assert_eq!(disk.node, "worker-0");
        assert_eq!(disk.labels[FILESYSTEM_JOB_LABEL], "true");
        assert_eq!(disk.labels[FILESYSTEM_NAME_LABEL], "fs1");

        let fs = filesystem_request("fs1", "ibm-spectrum-scale", vec!["sdb-0x1".into()]);
        assert_eq!(fs.replication, "1-way");
        assert_eq!(fs.filesystem_type, "shared");

        let sc = storage_class_request("fs1");
        assert_eq!(sc.provisioner, "spectrumscale.csi.ibm.com");
        assert_eq!(sc.parameters["volBackendFs"], "fs1");
    }
}

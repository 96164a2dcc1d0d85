//! Host Device Probes
//!
//! Checks against the host that decide whether a block device is free:
//! persistent by-id links, exclusive open, and bind mounts.

use crate::domain::ports::{BlockDevice, DeviceProbe};
use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

// =============================================================================
// Configuration
// =============================================================================

/// Host paths used by the probes
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Directory holding the device nodes
    pub dev_dir: PathBuf,
    /// Directory of persistent device links
    pub by_id_dir: PathBuf,
    /// Mount table of the host's init process
    pub mountinfo: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            by_id_dir: PathBuf::from("/dev/disk/by-id"),
            mountinfo: PathBuf::from("/proc/1/mountinfo"),
        }
    }
}

// =============================================================================
// Host Probe
// =============================================================================

/// Probes devices on the local host
pub struct HostDeviceProbe {
    config: ProbeConfig,
}

impl HostDeviceProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    fn device_node(&self, device: &BlockDevice) -> Result<PathBuf> {
        if device.kname.is_empty() {
            return Err(Error::DeviceProbe {
                device: device.name.clone(),
                reason: "empty kernel name".into(),
            });
        }
        Ok(self.config.dev_dir.join(&device.kname))
    }

    fn probe_error(device: &BlockDevice, reason: impl std::fmt::Display) -> Error {
        Error::DeviceProbe {
            device: device.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Default for HostDeviceProbe {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

impl DeviceProbe for HostDeviceProbe {
    fn path_by_id(&self, device: &BlockDevice) -> Result<String> {
        let target = fs::canonicalize(self.device_node(device)?)
            .map_err(|e| Self::probe_error(device, e))?;

        let mut links: Vec<PathBuf> = fs::read_dir(&self.config.by_id_dir)
            .map_err(|e| Self::probe_error(device, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        links.sort();

        links
            .into_iter()
            .find(|link| fs::canonicalize(link).map(|p| p == target).unwrap_or(false))
            .map(|link| link.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Self::probe_error(
                    device,
                    format!("no link in {} points to it", self.config.by_id_dir.display()),
                )
            })
    }

    fn can_open_exclusively(&self, device: &BlockDevice) -> Result<bool> {
        let node = self.device_node(device)?;
        match OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_EXCL)
            .open(&node)
        {
            Ok(_) => Ok(true),
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => Ok(false),
            Err(e) => Err(Self::probe_error(device, e)),
        }
    }

    fn bind_mount(&self, device: &BlockDevice) -> Result<Option<String>> {
        let table = fs::read_to_string(&self.config.mountinfo)
            .map_err(|e| Self::probe_error(device, e))?;
        Ok(find_bind_mount(&table, &device.kname))
    }
}

/// Find a mountinfo entry whose root is the device node.
///
/// Bind-mounted block devices show up with a root such as `/sdb` or
/// `/devtmpfs/sdb`; the mount point is returned.
pub fn find_bind_mount(mountinfo: &str, kname: &str) -> Option<String> {
    if kname.is_empty() {
        return None;
    }
    mountinfo.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() < 10 {
            return None;
        }
        let root = Path::new(fields[3]);
        (root.file_name()? == kname).then(|| fields[4].to_string())
    })
}

//! Device Classifier
//!
//! Turns filtered block devices into discovered devices: identity, type,
//! mechanical property and availability. Availability checks run from
//! cheapest to most expensive and the first failing check decides.

use crate::crd::{DeviceMechanicalProperty, DeviceState, DeviceType, DiscoveredDevice};
use crate::domain::ports::{BlockDevice, DeviceProbe};
use crate::hardware::discovery::filter::should_ignore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Device Classifier
// =============================================================================

/// Classifies block devices using host probes
pub struct DeviceClassifier {
    probe: Arc<dyn DeviceProbe>,
}

impl DeviceClassifier {
    pub fn new(probe: Arc<dyn DeviceProbe>) -> Self {
        Self { probe }
    }

    /// Availability of a device. Probe failures yield `Unknown`.
    pub fn device_status(&self, device: &BlockDevice) -> DeviceState {
        if !device.fs_type.is_empty() {
            info!(
                "device {:?} with filesystem {:?} is not available",
                device.name, device.fs_type
            );
            return DeviceState::NotAvailable;
        }

        if device.has_bios_boot_label() {
            info!(
                "device {:?} with part label {:?} is not available",
                device.name, device.part_label
            );
            return DeviceState::NotAvailable;
        }

        match self.probe.can_open_exclusively(device) {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    "device {:?} is not available as it can't be opened exclusively",
                    device.name
                );
                return DeviceState::NotAvailable;
            }
            Err(e) => {
                debug!("exclusive open probe failed: {}", e);
                return DeviceState::Unknown;
            }
        }

        match self.probe.bind_mount(device) {
            Ok(None) => {}
            Ok(Some(mount_point)) => {
                info!(
                    "device {:?} with mount point {:?} is not available",
                    device.name, mount_point
                );
                return DeviceState::NotAvailable;
            }
            Err(e) => {
                debug!("bind mount probe failed: {}", e);
                return DeviceState::Unknown;
            }
        }

        info!("device {:?} is available", device.name);
        DeviceState::Available
    }

    /// Build the discovered-device record for one block device
    pub fn classify(&self, device: &BlockDevice) -> DiscoveredDevice {
        let device_id = self.probe.path_by_id(device).unwrap_or_else(|e| {
            warn!(
                "failed to get persistent ID for the device {:?}. Error {}",
                device.name, e
            );
            String::new()
        });

        let path = device.dev_path().unwrap_or_else(|e| {
            warn!(
                "failed to parse path for the device {:?}. Error {}",
                device.kname, e
            );
            String::new()
        });

        DiscoveredDevice {
            device_id,
            path,
            model: device.model.clone(),
            device_type: DeviceType::from_lsblk(&device.device_type),
            vendor: device.vendor.clone(),
            serial: device.serial.clone(),
            size: device.size,
            property: DeviceMechanicalProperty::from_rotational(device.rotational),
            fs_type: device.fs_type.clone(),
            status: self.device_status(device).into(),
            wwn: device.wwn.clone(),
        }
    }

    /// Filter, classify and deduplicate a full device listing
    pub fn discover(&self, devices: &[BlockDevice]) -> Vec<DiscoveredDevice> {
        let discovered = devices
            .iter()
            .filter(|d| !should_ignore(d))
            .map(|d| self.classify(d))
            .collect();
        unique_devices(discovered)
    }
}

/// Remove duplicates keyed on `(device_id, path)`.
///
/// Multipath maps are listed once under every path device, so the same
/// map shows up several times. A later duplicate replaces the earlier
/// entry at the earlier entry's position.
pub fn unique_devices(devices: Vec<DiscoveredDevice>) -> Vec<DiscoveredDevice> {
    let mut unique: Vec<DiscoveredDevice> = Vec::with_capacity(devices.len());
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for device in devices {
        let key = (device.device_id.clone(), device.path.clone());
        match index.get(&key) {
            Some(&i) => unique[i] = device,
            None => {
                index.insert(key, unique.len());
                unique.push(device);
            }
        }
    }

    unique
}

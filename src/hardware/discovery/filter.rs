//! Device Filter
//!
//! Decides which listed block devices are candidates for discovery.

use crate::crd::DeviceType;
use crate::domain::ports::{BlockDevice, STATE_SUSPENDED};
use tracing::info;

/// Whether a device is left out of discovery.
///
/// Read-only devices, devices holding other devices, suspended devices
/// and types other than disk and mpath are skipped. A missing WWN is only
/// logged since some virtual transports never report one.
pub fn should_ignore(device: &BlockDevice) -> bool {
    match device.is_read_only() {
        Ok(false) => {}
        _ => {
            info!("ignoring read only device {:?}", device.name);
            return true;
        }
    }

    if !device.children.is_empty() {
        info!("ignoring root device {:?}", device.name);
        return true;
    }

    if device.state == STATE_SUSPENDED {
        info!(
            "ignoring device {:?} with invalid state {:?}",
            device.name, device.state
        );
        return true;
    }

    if !DeviceType::from_lsblk(&device.device_type).is_supported() {
        info!(
            "ignoring device {:?} with unsupported type {:?}",
            device.name, device.device_type
        );
        return true;
    }

    if device.wwn.trim().is_empty() {
        info!("device {:?} has no WWN", device.name);
    }

    false
}

//! Block Device Enumerator
//!
//! Lists block devices with `lsblk --json` and flattens the device tree
//! so nested devices (partitions, multipath maps) are visited too.

use crate::domain::ports::{BlockDevice, BlockDeviceLister};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Columns requested from lsblk
pub const LSBLK_COLUMNS: &str =
    "NAME,ROTA,TYPE,SIZE,MODEL,VENDOR,RO,RM,STATE,KNAME,SERIAL,PARTLABEL,FSTYPE,WWN";

// =============================================================================
// lsblk JSON
// =============================================================================

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

// Older util-linux prints flags as "0"/"1" strings and sizes as strings,
// newer releases print booleans and numbers.
#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    kname: Option<String>,
    #[serde(rename = "type", default)]
    device_type: Option<String>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    partlabel: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    wwn: Option<String>,
    #[serde(default)]
    rota: Option<Value>,
    #[serde(default)]
    ro: Option<Value>,
    #[serde(default)]
    rm: Option<Value>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

fn parse_flag(value: &Option<Value>) -> Option<bool> {
    match value.as_ref()? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "0" | "false" => Some(false),
            "1" | "true" => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn parse_size(value: &Option<Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn text(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

fn flatten(device: LsblkDevice, out: &mut Vec<BlockDevice>) {
    let children_names = device
        .children
        .iter()
        .map(|c| c.kname.clone().unwrap_or_else(|| c.name.clone()))
        .collect();

    let kname = device.kname.clone().unwrap_or_else(|| device.name.clone());
    out.push(BlockDevice {
        rotational: parse_flag(&device.rota),
        read_only: parse_flag(&device.ro),
        removable: parse_flag(&device.rm),
        size: parse_size(&device.size),
        name: device.name,
        kname,
        device_type: text(device.device_type),
        model: text(device.model),
        vendor: text(device.vendor),
        serial: text(device.serial),
        state: text(device.state),
        part_label: text(device.partlabel),
        fs_type: text(device.fstype),
        wwn: text(device.wwn),
        children: children_names,
    });

    for child in device.children {
        flatten(child, out);
    }
}

/// Parse `lsblk --json` output into a flat device list, parents first
pub fn parse_lsblk_output(json: &str) -> Result<Vec<BlockDevice>> {
    let output: LsblkOutput = serde_json::from_str(json)?;
    let mut devices = Vec::new();
    for device in output.blockdevices {
        flatten(device, &mut devices);
    }
    Ok(devices)
}

// =============================================================================
// lsblk Lister
// =============================================================================

/// Lists block devices by running lsblk
pub struct LsblkLister {
    program: String,
}

impl LsblkLister {
    pub fn new() -> Self {
        Self {
            program: "lsblk".to_string(),
        }
    }

    /// Use a different lsblk binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for LsblkLister {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockDeviceLister for LsblkLister {
    async fn list_block_devices(&self) -> Result<Vec<BlockDevice>> {
        let output = Command::new(&self.program)
            .args(["--json", "--bytes", "-o", LSBLK_COLUMNS])
            .output()
            .await
            .map_err(|e| Error::BlockDeviceListing(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::BlockDeviceListing(format!(
                "{} exited with {}, stderr={}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let devices = parse_lsblk_output(&stdout)?;
        debug!("lsblk reported {} block devices", devices.len());
        Ok(devices)
    }
}

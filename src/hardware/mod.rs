//! Hardware Module
//!
//! Node-local block device discovery and udev hotplug monitoring.

pub mod discovery;
pub mod udev;

pub use discovery::*;
pub use udev::*;

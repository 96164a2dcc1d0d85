//! Block Device Discovery Module
//!
//! Enumerates block devices with lsblk, filters out devices that can never
//! be used, and classifies the rest for the discovery result.

pub mod classifier;
pub mod filter;
pub mod lsblk;
pub mod probe;

pub use classifier::*;
pub use filter::*;
pub use lsblk::*;
pub use probe::*;

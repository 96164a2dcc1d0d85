//! Device Discovery
//!
//! The node agent that publishes free block devices into a per-node
//! `LocalVolumeDiscoveryResult`, and the reconciler that keeps the
//! `LocalVolumeDiscovery` status and its results in line with the cluster.

pub mod agent;
pub mod events;
pub mod orphans;
pub mod reconciler;
pub mod result;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{DeviceDiscovery, DiscoveryConfig, LoopState};
pub use events::EventReporter;
pub use orphans::{delete_orphan_results, node_matches};
pub use reconciler::{run_controller, ReconcilerContext};
pub use result::{result_name, DiscoveryResultSync, ResultIdentity};

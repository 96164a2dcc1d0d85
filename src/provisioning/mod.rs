//! Filesystem Provisioning
//!
//! The short-lived job that creates a Storage Scale filesystem from a set of
//! LUNs, and the cleanup and deletion operations that undo it.

pub mod job;
pub mod orchestrator;
pub mod phase;
pub mod resources;

pub use job::{JobArgs, JobRequest, LunSpec, Operation};
pub use orchestrator::FilesystemJob;
pub use phase::{CreatedResources, Phase, PhaseDetails, ProvisioningState};

//! Filesystem Job Requests
//!
//! Turns the job's flags and environment into a validated request for one
//! of the four operations.

use crate::error::{Error, Result};
use crate::provisioning::phase::CreatedResources;
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Namespace of the job itself when FUSION_NAMESPACE is unset
pub const DEFAULT_FUSION_NAMESPACE: &str = "ibm-fusion-access";

/// Operation performed by one job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    CreateFilesystem,
    CleanupFailedJob,
    CleanupFilesystem,
    DeleteFilesystem,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CreateFilesystem => write!(f, "create-filesystem"),
            Operation::CleanupFailedJob => write!(f, "cleanup-failed-job"),
            Operation::CleanupFilesystem => write!(f, "cleanup-filesystem"),
            Operation::DeleteFilesystem => write!(f, "delete-filesystem"),
        }
    }
}

/// A LUN selected for the filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LunSpec {
    pub path: String,
    pub wwn: String,
    pub node: String,
    #[serde(default)]
    pub is_reused: bool,
    /// Existing LocalDisk backing a reused LUN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_disk_name: Option<String>,
}

// =============================================================================
// Arguments
// =============================================================================

/// Flags of the `filesystem-job` subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// Operation to run
    #[arg(long, env = "OPERATION", value_enum)]
    pub operation: Option<Operation>,

    /// Filesystem to create
    #[arg(long, env = "FILESYSTEM_NAME")]
    pub filesystem_name: Option<String>,

    /// Namespace of the Storage Scale resources
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Job carrying the phase annotations
    #[arg(long, env = "JOB_NAME")]
    pub job_name: Option<String>,

    /// JSON array of LUNs that need a new LocalDisk
    #[arg(long, env = "NEW_LUNS_JSON")]
    pub new_luns_json: Option<String>,

    /// JSON array of LUNs that already have a LocalDisk
    #[arg(long, env = "REUSED_LUNS_JSON")]
    pub reused_luns_json: Option<String>,

    /// Namespace of the job
    #[arg(long, env = "FUSION_NAMESPACE")]
    pub fusion_namespace: Option<String>,

    /// Filesystem to delete
    #[arg(long, env = "TARGET_NAME")]
    pub target_name: Option<String>,

    /// Namespace of the filesystem to clean up
    #[arg(long, env = "TARGET_NAMESPACE")]
    pub target_namespace: Option<String>,

    /// Failed job to remove
    #[arg(long, env = "FAILED_JOB_NAME")]
    pub failed_job_name: Option<String>,

    #[arg(long, env = "FAILED_JOB_NAMESPACE")]
    pub failed_job_namespace: Option<String>,

    /// Checkpoint of the failed job, as written to its annotation
    #[arg(long, env = "CREATED_RESOURCES")]
    pub created_resources: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, var: &str) -> Result<String> {
    present(value).ok_or_else(|| {
        Error::Configuration(format!("{} environment variable is required", var))
    })
}

fn parse_luns(raw: &Option<String>, var: &str) -> Result<Vec<LunSpec>> {
    let Some(raw) = present(raw) else {
        return Ok(Vec::new());
    };
    let luns: Option<Vec<LunSpec>> = serde_json::from_str(&raw)
        .map_err(|e| Error::Configuration(format!("failed to parse {}: {}", var, e)))?;
    Ok(luns.unwrap_or_default())
}

// =============================================================================
// Requests
// =============================================================================

/// A Job by name and namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub name: String,
    pub namespace: String,
}

/// A Filesystem by name and namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemTarget {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFilesystemRequest {
    pub filesystem_name: String,
    pub namespace: String,
    pub new_luns: Vec<LunSpec>,
    pub reused_luns: Vec<LunSpec>,
    /// Job that receives the phase annotations
    pub job: JobRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailedJobRequest {
    pub target_namespace: String,
    pub failed_job: Option<JobRef>,
    pub created: CreatedResources,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFilesystemRequest {
    pub target: FilesystemTarget,
    pub failed_job: Option<JobRef>,
}

/// A validated job request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    CreateFilesystem(CreateFilesystemRequest),
    CleanupFailedJob(CleanupFailedJobRequest),
    CleanupFilesystem(CleanupFilesystemRequest),
    DeleteFilesystem(FilesystemTarget),
}

impl JobRequest {
    pub fn operation(&self) -> Operation {
        match self {
            JobRequest::CreateFilesystem(_) => Operation::CreateFilesystem,
            JobRequest::CleanupFailedJob(_) => Operation::CleanupFailedJob,
            JobRequest::CleanupFilesystem(_) => Operation::CleanupFilesystem,
            JobRequest::DeleteFilesystem(_) => Operation::DeleteFilesystem,
        }
    }
}

impl JobArgs {
    fn failed_job(&self) -> Option<JobRef> {
        match (
            present(&self.failed_job_name),
            present(&self.failed_job_namespace),
        ) {
            (Some(name), Some(namespace)) => Some(JobRef { name, namespace }),
            _ => None,
        }
    }

    fn target(&self) -> Result<FilesystemTarget> {
        match (present(&self.target_name), present(&self.target_namespace)) {
            (Some(name), Some(namespace)) => Ok(FilesystemTarget { name, namespace }),
            _ => Err(Error::Configuration(
                "TARGET_NAME and TARGET_NAMESPACE are required".into(),
            )),
        }
    }

    /// Validate the arguments for the selected operation
    pub fn into_request(self) -> Result<JobRequest> {
        let operation = self.operation.ok_or_else(|| {
            Error::Configuration("OPERATION environment variable is required".into())
        })?;

        match operation {
            Operation::CreateFilesystem => {
                let filesystem_name = required(&self.filesystem_name, "FILESYSTEM_NAME")?;
                let namespace = required(&self.namespace, "NAMESPACE")?;
                let job_name = required(&self.job_name, "JOB_NAME")?;
                let new_luns = parse_luns(&self.new_luns_json, "NEW_LUNS_JSON")?;
                let reused_luns = parse_luns(&self.reused_luns_json, "REUSED_LUNS_JSON")?;

                if new_luns.is_empty() && reused_luns.is_empty() {
                    return Err(Error::Configuration(
                        "no LUNs provided for filesystem creation".into(),
                    ));
                }
                if let Some(lun) = reused_luns
                    .iter()
                    .find(|l| l.local_disk_name.as_deref().unwrap_or("").is_empty())
                {
                    return Err(Error::Configuration(format!(
                        "reused LUN {} on {} has no localDiskName",
                        lun.path, lun.node
                    )));
                }

                Ok(JobRequest::CreateFilesystem(CreateFilesystemRequest {
                    filesystem_name,
                    namespace,
                    new_luns,
                    reused_luns,
                    job: JobRef {
                        name: job_name,
                        namespace: present(&self.fusion_namespace)
                            .unwrap_or_else(|| DEFAULT_FUSION_NAMESPACE.to_string()),
                    },
                }))
            }
            Operation::CleanupFailedJob => {
                let target_namespace = present(&self.target_namespace)
                    .ok_or_else(|| Error::Configuration("TARGET_NAMESPACE is required".into()))?;
                // an unreadable checkpoint aborts before anything, including
                // the failed job, is deleted
                let created = match present(&self.created_resources) {
                    Some(raw) => CreatedResources::from_json(&raw).map_err(|e| {
                        Error::Configuration(format!(
                            "failed to parse CREATED_RESOURCES: {}",
                            e
                        ))
                    })?,
                    None => CreatedResources::default(),
                };
                Ok(JobRequest::CleanupFailedJob(CleanupFailedJobRequest {
                    target_namespace,
                    failed_job: self.failed_job(),
                    created,
                }))
            }
            Operation::CleanupFilesystem => {
                Ok(JobRequest::CleanupFilesystem(CleanupFilesystemRequest {
                    target: self.target()?,
                    failed_job: self.failed_job(),
                }))
            }
            Operation::DeleteFilesystem => Ok(JobRequest::DeleteFilesystem(self.target()?)),
        }
    }
}

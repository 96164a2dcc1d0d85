//! Error types for the Fusion Access operator
//!
//! Provides structured error types for device discovery, udev monitoring,
//! discovery result reporting and filesystem provisioning jobs.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    // =========================================================================
    // Device Discovery Errors
    // =========================================================================
    #[error("Failed to list block devices: {0}")]
    BlockDeviceListing(String),

    #[error("Device probe failed for {device}: {reason}")]
    DeviceProbe { device: String, reason: String },

    #[error("Udev monitor error: {0}")]
    UdevMonitor(String),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    // =========================================================================
    // Provisioning Errors
    // =========================================================================
    #[error("{operation}: {reason}")]
    Provisioning { operation: String, reason: String },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Pull secret error: {0}")]
    PullSecret(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Wrap an error with the provisioning step it happened in
    pub fn provisioning(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Provisioning {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_) | Error::Io(_) => ErrorAction::RequeueWithBackoff,

            // Missing objects usually show up once their owner catches up
            Error::ResourceNotFound { .. } => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            Error::BlockDeviceListing(_) | Error::UdevMonitor(_) => {
                ErrorAction::RequeueAfter(Duration::from_secs(60))
            }

            // Configuration/validation errors - don't retry automatically
            Error::Configuration(_)
            | Error::Regex(_)
            | Error::PullSecret(_)
            | Error::JsonParse(_)
            | Error::Yaml(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::Io(_))
    }

    /// Check if this error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this error means the object already exists
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::ResourceExists { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

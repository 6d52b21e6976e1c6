//! Error types for deployctl

use std::time::Duration;

use deploy_api::models::LockInfo;
use thiserror::Error;

/// Main error type for deployctl
#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Deployment store error: {0}")]
    StoreError(String),

    #[error("deployment blocked by {}", .0.blocking_deployment_id)]
    DeploymentBlocked(LockInfo),

    #[error("deploy gate check failed: {reason}")]
    GateRejected { reason: String, remedy: String },

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Build failed: {}", .errors.join("; "))]
    BuildFailed { errors: Vec<String>, logs: Vec<String> },

    #[error("build failed: no version returned")]
    MissingVersion,

    #[error("Deploy cancelled by user")]
    Cancelled,

    #[error("Buildkit startup timeout after {0:?}")]
    StallTimeout(Duration),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Cancelled => 130,
            _ => 1,
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Internal(err.to_string())
    }
}

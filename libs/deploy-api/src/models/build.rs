//! Build stream models
//!
//! The builder answers a submission with newline-delimited JSON frames. Every
//! frame but the last carries a status update; the last one carries the
//! result of the build.

use serde::{Deserialize, Serialize};

/// One line of the build response stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildFrame {
    /// Base64 encoded solve status (see [`crate::models::SolveStatus`])
    Buildkit(String),
    /// Human readable activity message
    Message(String),
    /// Build side error
    Error(String),
    /// Final frame
    Result(BuildOutput),
}

/// Result of a finished build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOutput {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub access_info: Option<AccessInfo>,
}

/// How the deployed application can be reached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub default_route: bool,
    #[serde(default)]
    pub cluster_hostname: String,
}

//! Deployment record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version recorded on a deployment until the build produces a real one
pub const PENDING_BUILD_VERSION: &str = "pending-build";

/// Advisory stage of a deployment. Only ever written forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentPhase {
    Uploading,
    Building,
    Pushing,
    Activating,
}

impl DeploymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentPhase::Uploading => "uploading",
            DeploymentPhase::Building => "building",
            DeploymentPhase::Pushing => "pushing",
            DeploymentPhase::Activating => "activating",
        }
    }
}

impl std::fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal-or-not status of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Active,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Active => "active",
            DeploymentStatus::Failed => "failed",
        }
    }
}

/// Source control snapshot attached to a deployment at creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    pub sha: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default)]
    pub is_dirty: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_tree_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_author_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_author_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

/// Remote deployment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub app_name: String,
    pub cluster_id: String,
    pub app_version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DeploymentPhase>,
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_info: Option<GitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_logs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Describes the in-flight deployment that holds the app's deploy lock
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub blocking_deployment_id: String,
    #[serde(default)]
    pub started_by: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub lock_expires_at: Option<DateTime<Utc>>,
}

/// Create deployment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeploymentRequest {
    pub app_name: String,
    pub cluster_id: String,
    pub app_version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_info: Option<GitInfo>,
}

/// Create deployment response
///
/// A non-empty `error` means the create was rejected; `lock_info` is set when
/// the rejection is caused by another deployment in progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDeploymentResponse {
    #[serde(default)]
    pub deployment: Option<DeploymentRecord>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub lock_info: Option<LockInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePhaseRequest {
    pub phase: DeploymentPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppVersionRequest {
    pub app_version_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFailedRequest {
    pub error_message: String,
    #[serde(default)]
    pub build_logs: String,
}

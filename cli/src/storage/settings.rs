//! Settings file management

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::CliError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// CLI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cluster used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_cluster: Option<String>,

    /// Known clusters by name
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterSettings>,

    /// Seconds the build may stay silent after the upload before it is
    /// abandoned
    #[serde(default = "default_stall_window")]
    pub stall_window_secs: u64,

    /// Deadline in seconds for recording a failed deployment
    #[serde(default = "default_failure_report_timeout")]
    pub failure_report_timeout_secs: u64,

    /// Deadline in seconds for record API requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_stall_window() -> u64 {
    60
}

fn default_failure_report_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            active_cluster: None,
            clusters: BTreeMap::new(),
            stall_window_secs: default_stall_window(),
            failure_report_timeout_secs: default_failure_report_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing
    pub async fn load(file: &File) -> Result<Self, CliError> {
        Ok(file.read_json_opt().await?.unwrap_or_default())
    }

    /// Save settings readable by the owner only, they hold tokens
    pub async fn save(&self, file: &File) -> Result<(), CliError> {
        file.write_json(self).await?;
        file.set_permissions_600().await
    }

    /// Resolve a cluster by name, or the active one when `name` is `None`
    pub fn cluster(&self, name: Option<&str>) -> Result<(String, &ClusterSettings), CliError> {
        let name = match name.or(self.active_cluster.as_deref()) {
            Some(name) => name,
            None if self.clusters.len() == 1 => self.clusters.keys().next().map(String::as_str).unwrap_or_default(),
            None => {
                return Err(CliError::ConfigError(
                    "no cluster selected; pass --cluster or set active_cluster".to_string(),
                ))
            }
        };
        self.clusters
            .get(name)
            .map(|cluster| (name.to_string(), cluster))
            .ok_or_else(|| CliError::ConfigError(format!("unknown cluster: {}", name)))
    }

    pub fn stall_window(&self) -> Duration {
        Duration::from_secs(self.stall_window_secs)
    }

    pub fn failure_report_timeout(&self) -> Duration {
        Duration::from_secs(self.failure_report_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Connection settings of one cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Base URL of the cluster API
    pub base_url: String,

    /// Bearer token
    #[serde(default, with = "secret_token", skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,
}

mod secret_token {
    use super::*;

    pub fn serialize<S: Serializer>(token: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error> {
        token.as_ref().map(|t| t.expose_secret()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .filter(|t| !t.is_empty())
            .map(SecretString::from))
    }
}

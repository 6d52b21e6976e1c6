//! App analysis models
//!
//! The builder can inspect a source archive without building it and report
//! what a build would produce.

use serde::{Deserialize, Serialize};

/// What the builder detected in a source archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAnalysis {
    #[serde(default)]
    pub stack: String,
    /// Name from the app config, if any
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub entrypoint: String,
    /// Dockerfile used when the stack is `dockerfile`
    #[serde(default)]
    pub build_dockerfile: String,
    #[serde(default)]
    pub services: Vec<AnalyzedService>,
    /// Names of the environment variables the app sets, never their values
    #[serde(default)]
    pub env_vars: Vec<String>,
    #[serde(default)]
    pub events: Vec<DetectionEvent>,
}

/// A process the build would run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedService {
    pub name: String,
    /// Empty when the image default command is used
    #[serde(default)]
    pub command: String,
    /// Where the service was found, e.g. `Procfile`
    #[serde(default)]
    pub source: String,
}

/// One step of stack detection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// `detected`, `config`, `warning` and the like
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}

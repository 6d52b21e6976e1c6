//! Application configuration stored alongside the deployed source

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::CliError;
use crate::filesys::file::File;

/// Directory holding the app configuration, relative to the app root
pub const APP_CONFIG_DIR: &str = ".deployctl";
/// App configuration file name inside [`APP_CONFIG_DIR`]
pub const APP_CONFIG_FILE: &str = "app.json";

/// A process the app runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub command: String,
}

/// Contents of `.deployctl/app.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub name: String,

    /// Paths shipped even when `.gitignore` excludes them
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl AppConfig {
    /// Location of the config for the app rooted at `dir`
    pub fn file(dir: &Path) -> File {
        File::new(dir.join(APP_CONFIG_DIR).join(APP_CONFIG_FILE))
    }

    /// Load the config of the app rooted at `dir`, `None` if there is none
    pub async fn load(dir: &Path) -> Result<Option<Self>, CliError> {
        Self::file(dir).read_json_opt().await
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Check every include entry, returning the first invalid one
    pub fn validate_include(&self) -> Result<(), CliError> {
        for pattern in &self.include {
            validate_include_pattern(pattern)?;
        }
        Ok(())
    }
}

/// An include entry must be a non-empty path that stays inside the app root
pub fn validate_include_pattern(pattern: &str) -> Result<(), CliError> {
    let invalid = |why: &str| CliError::ConfigError(format!("{:?}: {}", pattern, why));

    if pattern.trim().is_empty() {
        return Err(invalid("empty pattern"));
    }
    let path = Path::new(pattern);
    if path.is_absolute() {
        return Err(invalid("must be relative to the app directory"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid("must not leave the app directory"));
    }
    Ok(())
}

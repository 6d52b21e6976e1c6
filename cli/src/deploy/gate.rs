//! Pre-deploy checks on the source directory

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::errors::CliError;
use crate::storage::app_config::{AppConfig, APP_CONFIG_DIR, APP_CONFIG_FILE};

/// Name of the service that must exist for a deploy to make sense
pub const WEB_SERVICE: &str = "web";

/// Decides whether a directory may be deployed
#[async_trait]
pub trait DeployGate: Send + Sync {
    /// `Ok` when the deploy may proceed, otherwise
    /// [`CliError::GateRejected`] carrying the reason and a remedy.
    async fn check_allowed(&self, dir: &Path) -> Result<(), CliError>;
}

/// Accepts every directory
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl DeployGate for AllowAll {
    async fn check_allowed(&self, _dir: &Path) -> Result<(), CliError> {
        Ok(())
    }
}

/// Requires an existing directory that defines a web service, either in
/// the app config or in a `Procfile`
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryGate;

fn rejected(reason: impl Into<String>, remedy: impl Into<String>) -> CliError {
    CliError::GateRejected {
        reason: reason.into(),
        remedy: remedy.into(),
    }
}

#[async_trait]
impl DeployGate for DirectoryGate {
    async fn check_allowed(&self, dir: &Path) -> Result<(), CliError> {
        let metadata = match fs::metadata(dir).await {
            Ok(metadata) => metadata,
            Err(_) => {
                return Err(rejected(
                    format!("deployment directory does not exist: {}", dir.display()),
                    "Ensure you are running the deploy command from the correct directory",
                ))
            }
        };
        if !metadata.is_dir() {
            return Err(rejected(
                format!("deployment path is not a directory: {}", dir.display()),
                "Provide a valid directory path for deployment",
            ));
        }

        let config = AppConfig::load(dir).await.map_err(|e| {
            rejected(
                format!("invalid app config: {}", e),
                format!("Fix the syntax of {}/{}", APP_CONFIG_DIR, APP_CONFIG_FILE),
            )
        })?;
        if config.as_ref().is_some_and(|c| c.has_service(WEB_SERVICE)) {
            debug!("web service defined in app config");
            return Ok(());
        }

        let procs = read_procfile(dir).await.map_err(|e| {
            rejected(
                format!("failed to parse Procfile: {}", e),
                "Use one `name: command` entry per line in Procfile",
            )
        })?;
        if procs.iter().any(|(name, command)| name == WEB_SERVICE && !command.is_empty()) {
            debug!("web service defined in Procfile");
            return Ok(());
        }

        Err(rejected(
            "no 'web' service defined",
            format!(
                "Define a web service that binds to $PORT.\n\
                 Option 1: Add to {dir}/{file}:\n  \
                 {{\"services\": {{\"web\": {{\"command\": \"your-start-command\"}}}}}}\n\
                 Option 2: Add to Procfile:\n  \
                 web: your-start-command",
                dir = APP_CONFIG_DIR,
                file = APP_CONFIG_FILE,
            ),
        ))
    }
}

/// `(name, command)` entries of the directory's Procfile; empty when there is none
async fn read_procfile(dir: &Path) -> Result<Vec<(String, String)>, String> {
    let Ok(contents) = fs::read_to_string(dir.join("Procfile")).await else {
        return Ok(Vec::new());
    };
    parse_procfile(&contents)
}

fn parse_procfile(contents: &str) -> Result<Vec<(String, String)>, String> {
    let mut procs = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, command)) = line.split_once(':') else {
            return Err(format!("invalid line {}: {:?}", index + 1, line));
        };
        procs.push((name.trim().to_string(), command.trim().to_string()));
    }
    Ok(procs)
}

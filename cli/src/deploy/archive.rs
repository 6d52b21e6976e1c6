//! Streaming source archive

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};

use crate::deploy::build::ArchiveStream;
use crate::errors::CliError;
use crate::storage::app_config::{validate_include_pattern, AppConfig};

/// Produces the gzip-compressed tar of an app directory
#[async_trait]
pub trait ArchiveBuilder: Send + Sync {
    /// Start archiving `dir`. Entries of `include` are shipped even when
    /// ignore rules would leave them out. The stream ends with an error if
    /// archiving fails part way.
    async fn build(&self, dir: &Path, include: &[String]) -> Result<ArchiveStream, CliError>;
}

/// Load the app config of `dir` and start its archive. Errors are ready to
/// show to the user.
pub async fn open_app_archive(dir: &Path, archiver: &dyn ArchiveBuilder) -> Result<ArchiveStream, String> {
    let config = AppConfig::load(dir)
        .await
        .map_err(|e| format!("Failed to load app config: {}", e))?
        .unwrap_or_default();
    config
        .validate_include()
        .map_err(|e| format!("Invalid include pattern: {}", e))?;

    archiver
        .build(dir, &config.include)
        .await
        .map_err(|e| format!("Failed to create tar: {}", e))
}

/// Archives with the system `tar`.
///
/// Inside a git work tree the member list comes from git, so `.gitignore`
/// rules apply; elsewhere the whole directory is archived. `.git` itself is
/// never shipped.
#[derive(Debug, Clone)]
pub struct TarArchiver {
    tar: PathBuf,
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self { tar: PathBuf::from("tar") }
    }
}

impl TarArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files to archive, `None` when `dir` is not a git work tree
    async fn member_list(&self, dir: &Path, include: &[String]) -> Option<Vec<String>> {
        let output = Command::new("git")
            .current_dir(dir)
            .args(["ls-files", "-z", "--cached", "--others", "--exclude-standard"])
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            debug!(dir = %dir.display(), "not a git work tree, archiving whole directory");
            return None;
        }

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        let listed = String::from_utf8_lossy(&output.stdout);
        let candidates = listed
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .chain(include.iter().map(|p| p.trim_end_matches('/').to_string()));
        for name in candidates {
            // tracked files deleted from the work tree are still in the index
            if tokio::fs::symlink_metadata(dir.join(&name)).await.is_ok() && seen.insert(name.clone()) {
                members.push(name);
            }
        }
        Some(members)
    }
}

#[async_trait]
impl ArchiveBuilder for TarArchiver {
    async fn build(&self, dir: &Path, include: &[String]) -> Result<ArchiveStream, CliError> {
        for pattern in include {
            validate_include_pattern(pattern)
                .map_err(|e| CliError::ArchiveError(format!("Invalid include pattern: {}", e)))?;
        }

        let members = self.member_list(dir, include).await;

        let mut command = Command::new(&self.tar);
        command
            .arg("-cz")
            .arg("--exclude=.git")
            .arg("-C")
            .arg(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match &members {
            Some(_) => {
                command.args(["--null", "-T", "-"]).stdin(Stdio::piped());
            }
            None => {
                command.arg(".").stdin(Stdio::null());
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| CliError::ArchiveError(format!("Failed to create tar: {}", e)))?;

        if let (Some(members), Some(mut stdin)) = (members, child.stdin.take()) {
            debug!(count = members.len(), "archiving git work tree");
            tokio::spawn(async move {
                let mut list = Vec::new();
                for name in members {
                    list.extend_from_slice(name.as_bytes());
                    list.push(0);
                }
                if let Err(e) = stdin.write_all(&list).await {
                    warn!("failed to pass member list to tar: {}", e);
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CliError::ArchiveError("Failed to create tar: no output pipe".to_string()))?;
        let mut stderr = child.stderr.take();

        let exit = stream::once(async move {
            let mut message = String::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_string(&mut message).await;
            }
            match child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some(io::Error::other(format!(
                    "tar exited with {}: {}",
                    status,
                    message.trim()
                ))),
                Err(e) => Some(e),
            }
        })
        .filter_map(|err| async move { err.map(Err) });

        let bytes = ReaderStream::new(stdout).chain(exit);
        Ok(Box::pin(StreamReader::new(bytes)))
    }
}

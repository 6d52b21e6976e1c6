//! Git metadata of the deployed directory

use std::path::Path;

use chrono::{DateTime, Utc};
use deploy_api::models::GitInfo;
use tokio::process::Command;
use tracing::debug;

use crate::errors::CliError;
use crate::utils::sha256_hash;

/// Inspect the repository containing `dir`.
///
/// Best effort: returns `None` when `dir` is not inside a repository or git
/// is unavailable. Individual fields that cannot be read stay empty.
pub async fn inspect(dir: &Path) -> Option<GitInfo> {
    if run_git(dir, &["rev-parse", "--git-dir"]).await.is_err() {
        debug!(dir = %dir.display(), "not a git repository, skipping git info");
        return None;
    }

    let sha = match run_git(dir, &["rev-parse", "HEAD"]).await {
        Ok(sha) => sha,
        Err(e) => {
            debug!("unable to resolve HEAD: {}", e);
            return None;
        }
    };

    let branch = match run_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await {
        Ok(branch) => branch,
        Err(_) => run_git(dir, &["symbolic-ref", "--short", "HEAD"])
            .await
            .unwrap_or_default(),
    };

    let status = run_git(dir, &["status", "--porcelain"]).await.unwrap_or_default();
    let is_dirty = !status.is_empty();
    let working_tree_hash = if is_dirty {
        let diff = run_git(dir, &["diff", "HEAD"]).await.unwrap_or_default();
        let mut state = status.into_bytes();
        state.extend_from_slice(diff.as_bytes());
        sha256_hash(&state)[..8].to_string()
    } else {
        String::new()
    };

    let commit_timestamp = run_git(dir, &["log", "-1", "--pretty=%cI"])
        .await
        .ok()
        .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Some(GitInfo {
        sha,
        branch,
        repository: run_git(dir, &["config", "--get", "remote.origin.url"])
            .await
            .unwrap_or_default(),
        is_dirty,
        working_tree_hash,
        commit_message: run_git(dir, &["log", "-1", "--pretty=%B"]).await.unwrap_or_default(),
        commit_author_name: run_git(dir, &["log", "-1", "--pretty=%an"]).await.unwrap_or_default(),
        commit_author_email: run_git(dir, &["log", "-1", "--pretty=%ae"]).await.unwrap_or_default(),
        commit_timestamp,
    })
}

/// Run a git command in `dir` and return its trimmed stdout
async fn run_git(dir: &Path, args: &[&str]) -> Result<String, CliError> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .await?;

    if !output.status.success() {
        return Err(CliError::Internal(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// First eight characters of a commit id
pub fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

//! Dry run: ship the archive to the builder for inspection only

use std::path::Path;

use async_trait::async_trait;
use deploy_api::models::AppAnalysis;
use tracing::info;

use crate::deploy::archive::{open_app_archive, ArchiveBuilder};
use crate::deploy::build::ArchiveStream;
use crate::errors::CliError;

/// Asks the builder what it would build from an archive
#[async_trait]
pub trait AppAnalyzer: Send + Sync {
    async fn analyze_tar(&self, archive: ArchiveStream) -> Result<AppAnalysis, CliError>;
}

/// Archive `dir` the same way a deploy does and have it analyzed. No
/// deployment record is created.
pub async fn analyze_dir(
    dir: &Path,
    archiver: &dyn ArchiveBuilder,
    analyzer: &dyn AppAnalyzer,
) -> Result<AppAnalysis, CliError> {
    let archive = open_app_archive(dir, archiver).await.map_err(CliError::ArchiveError)?;
    let analysis = analyzer.analyze_tar(archive).await?;
    info!(stack = %analysis.stack, services = analysis.services.len(), "app analyzed");
    Ok(analysis)
}

//! Remote build seam

use std::pin::Pin;

use async_trait::async_trait;
use deploy_api::models::BuildOutput;
use tokio::io::AsyncRead;

use crate::errors::CliError;

/// Source archive bytes as they are produced
pub type ArchiveStream = Pin<Box<dyn AsyncRead + Send>>;

/// One status update from the builder, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatusEvent {
    /// Encoded solve status from the build engine
    Buildkit(Vec<u8>),
    /// Human readable activity
    Message(String),
    /// Build side error; the submission fails once one is seen
    Error(String),
}

/// Receives build status events while a submission runs
#[async_trait]
pub trait StatusSink: Send {
    async fn on_event(&mut self, event: BuildStatusEvent);
}

/// Submits an archive to the remote builder
#[async_trait]
pub trait BuildSubmitter: Send + Sync {
    /// Stream `archive` to the builder for `app`, forwarding every status
    /// event to `sink`, and return the build result.
    async fn build_from_tar(
        &self,
        app: &str,
        archive: ArchiveStream,
        sink: &mut dyn StatusSink,
    ) -> Result<BuildOutput, CliError>;
}

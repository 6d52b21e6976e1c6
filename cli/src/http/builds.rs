//! Build API client

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use deploy_api::models::{AppAnalysis, BuildFrame, BuildOutput};
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Body, Method};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};

use crate::deploy::analyze::AppAnalyzer;
use crate::deploy::build::{ArchiveStream, BuildStatusEvent, BuildSubmitter, StatusSink};
use crate::errors::CliError;
use crate::http::client::HttpClient;

/// Content type of the uploaded source archive
pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-tar+gzip";

/// Longest status line accepted from the builder
const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// [`BuildSubmitter`] posting the archive to the cluster API and reading
/// the newline delimited JSON response as it arrives
#[derive(Debug, Clone)]
pub struct HttpBuildClient {
    client: HttpClient,
}

impl HttpBuildClient {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BuildSubmitter for HttpBuildClient {
    async fn build_from_tar(
        &self,
        app: &str,
        archive: ArchiveStream,
        sink: &mut dyn StatusSink,
    ) -> Result<BuildOutput, CliError> {
        let url = self.client.endpoint(&["apps", app, "builds"])?;
        let request = self
            .client
            .request_url(Method::POST, url)
            .header(header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE)
            .body(Body::wrap_stream(ReaderStream::new(archive)));

        let response = self.client.send(request, "POST").await?;
        debug!(status = %response.status(), "build accepted, reading status stream");

        let body = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let mut lines = FramedRead::new(body, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));

        let mut output = None;
        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| CliError::TransportError(format!("reading build stream: {}", e)))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let frame: BuildFrame = match serde_json::from_str(line) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("skipping unreadable build frame: {}", e);
                    continue;
                }
            };
            match frame {
                BuildFrame::Buildkit(encoded) => match STANDARD.decode(encoded.as_bytes()) {
                    Ok(bytes) => sink.on_event(BuildStatusEvent::Buildkit(bytes)).await,
                    Err(e) => {
                        sink.on_event(BuildStatusEvent::Error(format!(
                            "failed to decode build status: {}",
                            e
                        )))
                        .await
                    }
                },
                BuildFrame::Message(message) => sink.on_event(BuildStatusEvent::Message(message)).await,
                BuildFrame::Error(error) => sink.on_event(BuildStatusEvent::Error(error)).await,
                BuildFrame::Result(result) => output = Some(result),
            }
        }

        output.ok_or_else(|| CliError::TransportError("build stream ended without a result".to_string()))
    }
}

#[async_trait]
impl AppAnalyzer for HttpBuildClient {
    async fn analyze_tar(&self, archive: ArchiveStream) -> Result<AppAnalysis, CliError> {
        let url = self.client.endpoint(&["analyze"])?;
        let request = self
            .client
            .request_url(Method::POST, url)
            .header(header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE)
            .body(Body::wrap_stream(ReaderStream::new(archive)));

        let response = self.client.send(request, "POST").await?;
        response
            .json()
            .await
            .map_err(|e| CliError::TransportError(format!("reading analysis: {}", e)))
    }
}

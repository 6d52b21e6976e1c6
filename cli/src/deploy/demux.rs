//! Build status demultiplexer
//!
//! Splits the ordered build event stream into transfer progress, build
//! errors, build logs, activity messages and the decoded statuses shown by
//! the presentation. It also owns the one transition from uploading to
//! building, which two different signals can trigger.

use async_trait::async_trait;
use deploy_api::models::SolveStatus;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::deploy::build::{BuildStatusEvent, StatusSink};
use crate::progress::phase::{PhaseSummary, PhaseTracker, UPLOAD_PHASE};
use crate::progress::transfer::TransferTable;
use crate::progress::ProgressHub;
use crate::utils::{format_bytes, format_speed};

/// Activity message announcing that the source upload is over
pub const LAUNCHING_BUILDER: &str = "Launching builder";

/// Everything the demultiplexer collected during a submission
#[derive(Debug, Clone, Default)]
pub struct DemuxReport {
    pub errors: Vec<String>,
    pub logs: Vec<String>,
    pub transfers: TransferTable,
    pub phases: Vec<PhaseSummary>,
}

/// Consumes build status events for one submission
pub struct StatusDemux {
    hub: ProgressHub,
    transfers: TransferTable,
    errors: Vec<String>,
    logs: Vec<String>,
    phases: PhaseTracker,
    builder_started: Option<oneshot::Sender<()>>,
}

impl StatusDemux {
    /// `builder_started` fires once, when the upload phase closes
    pub fn new(hub: ProgressHub, builder_started: oneshot::Sender<()>) -> Self {
        Self {
            hub,
            transfers: TransferTable::new(),
            errors: Vec::new(),
            logs: Vec::new(),
            phases: PhaseTracker::new(Instant::now()),
            builder_started: Some(builder_started),
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn transfers(&self) -> &TransferTable {
        &self.transfers
    }

    pub fn upload_closed(&self) -> bool {
        self.phases.has(UPLOAD_PHASE)
    }

    /// Record a completed phase and publish the updated list
    pub fn complete_phase(&mut self, name: &str, details: impl Into<String>) -> bool {
        let recorded = self.phases.complete(name, details, Instant::now());
        if recorded {
            self.hub.phases.publish(self.phases.summaries().to_vec());
        }
        recorded
    }

    /// Record an error raised outside the event stream
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn finish(self) -> DemuxReport {
        DemuxReport {
            errors: self.errors,
            logs: self.logs,
            transfers: self.transfers,
            phases: self.phases.summaries().to_vec(),
        }
    }

    fn close_upload(&mut self) {
        if self.upload_closed() {
            return;
        }
        let details = self
            .hub
            .upload
            .current()
            .map(|s| {
                format!(
                    "{} uploaded at {}",
                    format_bytes(s.bytes_read),
                    format_speed(s.bytes_per_second)
                )
            })
            .unwrap_or_default();
        if self.complete_phase(UPLOAD_PHASE, details) {
            info!("upload complete, builder started");
            if let Some(tx) = self.builder_started.take() {
                let _ = tx.send(());
            }
        }
    }

    async fn on_solve_status(&mut self, status: SolveStatus) {
        let mut upserted = false;
        for transfer in &status.statuses {
            if transfer.total != 0 {
                self.transfers.upsert(&transfer.id, transfer.total, transfer.current);
                upserted = true;
            }
        }

        for vertex in &status.vertexes {
            if !vertex.error.is_empty() {
                warn!(step = %vertex.name, "build step failed: {}", vertex.error);
                self.errors.push(vertex.error.clone());
            }
        }

        for log in &status.logs {
            let text = String::from_utf8_lossy(&log.data);
            let line = text.trim();
            if !line.is_empty() {
                self.logs.push(line.to_string());
            }
        }

        if upserted {
            self.close_upload();
            self.hub.transfers.publish(self.transfers.clone());
        }

        if !self.hub.statuses.deliver(status).await {
            debug!("status not delivered to presentation");
        }
    }
}

#[async_trait]
impl StatusSink for StatusDemux {
    async fn on_event(&mut self, event: BuildStatusEvent) {
        match event {
            BuildStatusEvent::Buildkit(bytes) => match SolveStatus::from_slice(&bytes) {
                Ok(status) => self.on_solve_status(status).await,
                Err(e) => {
                    warn!("failed to decode build status: {}", e);
                    self.errors.push(format!("failed to decode build status: {}", e));
                }
            },
            BuildStatusEvent::Message(message) => {
                debug!(%message, "builder activity");
                if message == LAUNCHING_BUILDER {
                    self.close_upload();
                }
                self.hub.activity.publish(message);
            }
            BuildStatusEvent::Error(error) => {
                warn!("builder reported an error: {}", error);
                self.errors.push(error);
            }
        }
    }
}

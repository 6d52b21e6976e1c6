//! Deploy orchestrator
//!
//! Drives one deploy run through [`DeployFsm`]: gate check, record creation,
//! streaming the source archive into the remote build, and the final
//! bookkeeping on the deployment record. The presentation runs on its own
//! task and may end the run early by cancelling the operation token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deploy_api::models::{AccessInfo, BuildOutput, DeploymentPhase};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::deploy::archive::{open_app_archive, ArchiveBuilder};
use crate::deploy::build::{ArchiveStream, BuildSubmitter};
use crate::deploy::demux::StatusDemux;
use crate::deploy::fsm::{DeployEvent, DeployFsm, DeployState};
use crate::deploy::gate::DeployGate;
use crate::deploy::git;
use crate::deploy::lifecycle::{DeploymentStore, LifecycleManager};
use crate::errors::CliError;
use crate::progress::phase::{PhaseSummary, BUILD_PHASE};
use crate::progress::reader::ProgressReader;
use crate::progress::{channels, PresentationControl, PresentationOutcome, Presenter, ProgressHub};

/// Record message for a user interrupt
pub const CANCELLED_MESSAGE: &str = "Deploy cancelled by user";
/// Record message when the build never started moving
pub const TIMEOUT_MESSAGE: &str = "Buildkit startup timeout";
/// Record message when the build returned no version
pub const MISSING_VERSION_MESSAGE: &str = "Build failed: no version returned";

/// What is being deployed, and where
#[derive(Debug, Clone)]
pub struct Target {
    pub app_name: String,
    pub cluster_id: String,
    pub dir: PathBuf,
}

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct Options {
    /// Stall window enforced by the presentation, reported in the error
    pub stall_window: Duration,
    /// Deadline of the detached failure report
    pub failure_report_timeout: Duration,
    /// Capacity of the build status mailbox
    pub status_capacity: usize,
    /// Attach git metadata of the source directory to the record
    pub inspect_git: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stall_window: Duration::from_secs(60),
            failure_report_timeout: Duration::from_secs(10),
            status_capacity: 64,
            inspect_git: true,
        }
    }
}

/// External services a run talks to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DeploymentStore>,
    pub builder: Arc<dyn BuildSubmitter>,
    pub archiver: Arc<dyn ArchiveBuilder>,
    pub gate: Arc<dyn DeployGate>,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub deployment_id: String,
    pub version: String,
    pub access_info: Option<AccessInfo>,
    pub phases: Vec<PhaseSummary>,
}

/// Everything a run produced, successful or not
#[derive(Debug)]
pub struct DeployRun {
    pub fsm: DeployFsm,
    /// Id of the record, when one was created
    pub deployment_id: Option<String>,
    pub result: Result<DeployReport, CliError>,
}

impl DeployRun {
    pub fn state(&self) -> DeployState {
        self.fsm.state()
    }

    pub fn into_result(self) -> Result<DeployReport, CliError> {
        self.result
    }
}

pub struct DeployOrchestrator {
    collaborators: Collaborators,
    target: Target,
    options: Options,
}

/// How the submission phase ended
enum Submission {
    Cancelled,
    Finished(Result<BuildOutput, CliError>),
}

impl DeployOrchestrator {
    pub fn new(collaborators: Collaborators, target: Target, options: Options) -> Self {
        Self {
            collaborators,
            target,
            options,
        }
    }

    /// Run the deploy. `op` is the operation token: cancelling it, from the
    /// presentation or a process signal, fails the run as cancelled.
    pub async fn run(&self, presenter: Box<dyn Presenter>, op: CancellationToken) -> DeployRun {
        let mut fsm = DeployFsm::new();
        let mut deployment_id = None;
        let result = self.execute(&mut fsm, &mut deployment_id, presenter, op).await;
        match &result {
            Ok(report) => info!(deployment_id = %report.deployment_id, version = %report.version, "deploy finished"),
            Err(e) => warn!(state = %fsm.state(), "deploy failed: {}", e),
        }
        DeployRun {
            fsm,
            deployment_id,
            result,
        }
    }

    async fn execute(
        &self,
        fsm: &mut DeployFsm,
        deployment_id: &mut Option<String>,
        presenter: Box<dyn Presenter>,
        op: CancellationToken,
    ) -> Result<DeployReport, CliError> {
        let target = &self.target;

        if let Err(e) = self.collaborators.gate.check_allowed(&target.dir).await {
            transition(fsm, DeployEvent::GateFailed);
            return Err(e);
        }

        let git_info = if self.options.inspect_git {
            git::inspect(&target.dir).await
        } else {
            None
        };
        if let Some(info) = &git_info {
            debug!(sha = git::short_sha(&info.sha), dirty = info.is_dirty, "git info collected");
        }

        let lifecycle = match LifecycleManager::create(
            self.collaborators.store.clone(),
            &target.app_name,
            &target.cluster_id,
            git_info,
            self.options.failure_report_timeout,
        )
        .await
        {
            Ok(lifecycle) => lifecycle,
            Err(e) => {
                transition(fsm, DeployEvent::GateFailed);
                return Err(e);
            }
        };
        *deployment_id = Some(lifecycle.id().to_string());
        transition(fsm, DeployEvent::GatePassed);
        lifecycle.advance_phase(DeploymentPhase::Uploading).await;

        if op.is_cancelled() {
            return Err(self.cancelled(fsm, &lifecycle, &[], &[]).await);
        }

        let archive = match self.open_archive().await {
            Ok(archive) => archive,
            Err(message) => {
                error!("{}", message);
                transition(fsm, DeployEvent::ArchiveFailed);
                lifecycle.mark_failed(&message, &[], &[]).await;
                return Err(CliError::ArchiveError(message));
            }
        };

        let (hub, feeds) = channels(self.options.status_capacity, presenter.status_overflow());
        let archive = track_upload(archive, &hub);

        let control = PresentationControl {
            op: op.clone(),
            done: CancellationToken::new(),
        };
        let presentation = tokio::spawn(presenter.present(feeds, control.clone()));

        let (started_tx, mut started_rx) = oneshot::channel();
        let mut demux = StatusDemux::new(hub, started_tx);
        let mut building_update = None;

        let submission = {
            let submit = self
                .collaborators
                .builder
                .build_from_tar(&target.app_name, archive, &mut demux);
            tokio::pin!(submit);
            let mut started = false;

            loop {
                tokio::select! {
                    biased;
                    _ = op.cancelled() => break Submission::Cancelled,
                    signal = &mut started_rx, if !started => {
                        started = true;
                        if signal.is_ok() {
                            transition(fsm, DeployEvent::BuilderStarted);
                            let lifecycle = lifecycle.clone();
                            building_update = Some(tokio::spawn(async move {
                                lifecycle.advance_phase(DeploymentPhase::Building).await;
                            }));
                        }
                    }
                    result = &mut submit => break Submission::Finished(result),
                }
            }
        };

        // the signal can land in the same poll that finished the submission
        if fsm.state() == DeployState::Uploading && started_rx.try_recv().is_ok() {
            transition(fsm, DeployEvent::BuilderStarted);
            lifecycle.advance_phase(DeploymentPhase::Building).await;
        }
        if let Some(update) = building_update {
            let _ = update.await;
        }

        let succeeded = matches!(&submission, Submission::Finished(Ok(_))) && demux.errors().is_empty();
        if succeeded {
            let layers = demux.transfers().len();
            demux.complete_phase(BUILD_PHASE, format!("{} layers processed", layers));
        }

        control.done.cancel();
        let outcome = match presentation.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("presentation failed: {}", e);
                PresentationOutcome::default()
            }
            Err(e) => {
                error!("presentation task aborted: {}", e);
                PresentationOutcome::default()
            }
        };

        let report = demux.finish();

        let output = match submission {
            Submission::Cancelled if outcome.timed_out => {
                transition(fsm, DeployEvent::Stalled);
                lifecycle.mark_failed(TIMEOUT_MESSAGE, &report.logs, &report.errors).await;
                return Err(CliError::StallTimeout(self.options.stall_window));
            }
            Submission::Cancelled => {
                return Err(self.cancelled(fsm, &lifecycle, &report.logs, &report.errors).await);
            }
            Submission::Finished(Err(e)) => {
                transition(fsm, DeployEvent::BuildFailed);
                let message = format!("Build failed: {}", e);
                lifecycle.mark_failed(&message, &report.logs, &report.errors).await;
                return Err(e);
            }
            Submission::Finished(Ok(_)) if !report.errors.is_empty() => {
                transition(fsm, DeployEvent::BuildFailed);
                let message = format!("Build failed: {}", report.errors.join("; "));
                lifecycle.mark_failed(&message, &report.logs, &report.errors).await;
                return Err(CliError::BuildFailed {
                    errors: report.errors,
                    logs: report.logs,
                });
            }
            Submission::Finished(Ok(output)) => output,
        };

        // a build that ran without any upload signal still went through building
        if fsm.state() == DeployState::Uploading {
            transition(fsm, DeployEvent::BuilderStarted);
            lifecycle.advance_phase(DeploymentPhase::Building).await;
        }

        transition(fsm, DeployEvent::BuildSucceeded);
        lifecycle.advance_phase(DeploymentPhase::Pushing).await;

        if output.version.is_empty() {
            transition(fsm, DeployEvent::VersionMissing);
            lifecycle
                .mark_failed(MISSING_VERSION_MESSAGE, &report.logs, &report.errors)
                .await;
            return Err(CliError::MissingVersion);
        }

        lifecycle.attach_version(&output.version).await;
        transition(fsm, DeployEvent::VersionAttached);
        lifecycle.advance_phase(DeploymentPhase::Activating).await;

        lifecycle.mark_active().await;
        transition(fsm, DeployEvent::Activated);

        Ok(DeployReport {
            deployment_id: lifecycle.id().to_string(),
            version: output.version,
            access_info: output.access_info,
            phases: report.phases,
        })
    }

    async fn open_archive(&self) -> Result<ArchiveStream, String> {
        open_app_archive(&self.target.dir, self.collaborators.archiver.as_ref()).await
    }

    async fn cancelled(
        &self,
        fsm: &mut DeployFsm,
        lifecycle: &LifecycleManager,
        logs: &[String],
        errors: &[String],
    ) -> CliError {
        info!("deploy interrupted");
        transition(fsm, DeployEvent::Interrupted);
        lifecycle.mark_failed(CANCELLED_MESSAGE, logs, errors).await;
        CliError::Cancelled
    }
}

/// Publish upload samples of `archive` into the hub
fn track_upload(archive: ArchiveStream, hub: &ProgressHub) -> ArchiveStream {
    let upload = hub.upload.clone();
    Box::pin(ProgressReader::new(
        archive,
        Box::new(move |sample| upload.publish(sample)),
    ))
}

fn transition(fsm: &mut DeployFsm, event: DeployEvent) {
    let from = fsm.state();
    match fsm.process(event) {
        Ok(to) => info!(%from, %to, "deploy state changed"),
        Err(e) => warn!("{}", e),
    }
}

//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use deploy_api::models::{
    AccessInfo, BuildOutput, CreateDeploymentRequest, CreateDeploymentResponse, DeploymentPhase,
    DeploymentRecord, DeploymentStatus, LockInfo,
};
use deployctl::deploy::archive::ArchiveBuilder;
use deployctl::deploy::build::{ArchiveStream, BuildStatusEvent, BuildSubmitter, StatusSink};
use deployctl::deploy::gate::DeployGate;
use deployctl::deploy::lifecycle::DeploymentStore;
use deployctl::errors::CliError;
use tokio::io::AsyncReadExt;

/// One call received by [`RecordingStore`]
#[derive(Debug, Clone)]
pub enum StoreCall {
    Create(CreateDeploymentRequest),
    Phase(DeploymentPhase),
    AppVersion(String),
    Status(DeploymentStatus, Option<String>),
    Failed { message: String, logs: String },
}

/// In-memory deployment store recording every call
#[derive(Clone)]
pub struct RecordingStore {
    calls: Arc<Mutex<Vec<StoreCall>>>,
    create_response: Arc<Mutex<CreateDeploymentResponse>>,
    fail_rich_update: bool,
    failed_delay: Duration,
}

pub const DEPLOYMENT_ID: &str = "dep-7";

impl RecordingStore {
    pub fn new() -> Self {
        let record = DeploymentRecord {
            id: DEPLOYMENT_ID.to_string(),
            app_name: "shop".to_string(),
            cluster_id: "prod".to_string(),
            app_version_id: "pending-build".to_string(),
            phase: None,
            status: DeploymentStatus::Pending,
            git_info: None,
            error_message: None,
            build_logs: None,
            deployed_at: None,
        };
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            create_response: Arc::new(Mutex::new(CreateDeploymentResponse {
                deployment: Some(record),
                ..Default::default()
            })),
            fail_rich_update: false,
            failed_delay: Duration::ZERO,
        }
    }

    /// Store whose create call reports a lock held by another deployment
    pub fn locked(lock: LockInfo) -> Self {
        let store = Self::new();
        *store.create_response.lock().unwrap() = CreateDeploymentResponse {
            deployment: None,
            error: Some("deployment lock held".to_string()),
            lock_info: Some(lock),
        };
        store
    }

    pub fn with_create_response(self, response: CreateDeploymentResponse) -> Self {
        *self.create_response.lock().unwrap() = response;
        self
    }

    /// Make the rich failure update return an error
    pub fn failing_rich_update(mut self) -> Self {
        self.fail_rich_update = true;
        self
    }

    /// Delay the rich failure update
    pub fn slow_failure_report(mut self, delay: Duration) -> Self {
        self.failed_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<DeploymentPhase> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Phase(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Create(_)))
            .count()
    }

    pub fn active_marks(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Status(DeploymentStatus::Active, _)))
            .count()
    }

    /// Rich failure reports and status-only failure updates
    pub fn failure_marks(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    StoreCall::Failed { .. } | StoreCall::Status(DeploymentStatus::Failed, _)
                )
            })
            .collect()
    }

    /// Message of the only failure recorded
    pub fn failure_message(&self) -> String {
        let marks = self.failure_marks();
        assert_eq!(marks.len(), 1, "expected exactly one failure mark: {:?}", marks);
        match &marks[0] {
            StoreCall::Failed { message, .. } => message.clone(),
            StoreCall::Status(_, message) => message.clone().unwrap_or_default(),
            _ => unreachable!(),
        }
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DeploymentStore for RecordingStore {
    async fn create(&self, request: CreateDeploymentRequest) -> Result<CreateDeploymentResponse, CliError> {
        self.record(StoreCall::Create(request));
        Ok(self.create_response.lock().unwrap().clone())
    }

    async fn update_phase(&self, _id: &str, phase: DeploymentPhase) -> Result<(), CliError> {
        self.record(StoreCall::Phase(phase));
        Ok(())
    }

    async fn update_app_version(&self, _id: &str, version: &str) -> Result<(), CliError> {
        self.record(StoreCall::AppVersion(version.to_string()));
        Ok(())
    }

    async fn update_status(
        &self,
        _id: &str,
        status: DeploymentStatus,
        error_message: Option<&str>,
    ) -> Result<(), CliError> {
        self.record(StoreCall::Status(status, error_message.map(str::to_string)));
        Ok(())
    }

    async fn update_failed(&self, _id: &str, error_message: &str, build_logs: &str) -> Result<(), CliError> {
        if !self.failed_delay.is_zero() {
            tokio::time::sleep(self.failed_delay).await;
        }
        if self.fail_rich_update {
            return Err(CliError::StoreError("rich update rejected".to_string()));
        }
        self.record(StoreCall::Failed {
            message: error_message.to_string(),
            logs: build_logs.to_string(),
        });
        Ok(())
    }
}

/// One scripted builder action
#[derive(Debug, Clone)]
pub enum Step {
    /// Read the whole archive, as the upload would
    Upload,
    Event(BuildStatusEvent),
    Sleep(Duration),
    /// Never return
    Hang,
    Finish(BuildOutput),
    Fail(String),
}

/// Builder replaying a fixed script
#[derive(Clone)]
pub struct ScriptedBuilder {
    steps: Arc<Mutex<VecDeque<Step>>>,
    uploaded: Arc<Mutex<usize>>,
}

impl ScriptedBuilder {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            uploaded: Arc::new(Mutex::new(0)),
        }
    }

    pub fn uploaded_bytes(&self) -> usize {
        *self.uploaded.lock().unwrap()
    }

    fn next_step(&self) -> Option<Step> {
        self.steps.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl BuildSubmitter for ScriptedBuilder {
    async fn build_from_tar(
        &self,
        _app: &str,
        mut archive: ArchiveStream,
        sink: &mut dyn StatusSink,
    ) -> Result<BuildOutput, CliError> {
        while let Some(step) = self.next_step() {
            match step {
                Step::Upload => {
                    let mut bytes = Vec::new();
                    archive
                        .read_to_end(&mut bytes)
                        .await
                        .map_err(|e| CliError::TransportError(e.to_string()))?;
                    *self.uploaded.lock().unwrap() += bytes.len();
                }
                Step::Event(event) => sink.on_event(event).await,
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Hang => std::future::pending::<()>().await,
                Step::Finish(output) => return Ok(output),
                Step::Fail(message) => return Err(CliError::TransportError(message)),
            }
        }
        Err(CliError::TransportError("build stream ended without a result".to_string()))
    }
}

/// Archiver serving fixed bytes
#[derive(Clone)]
pub struct MemoryArchiver {
    bytes: Vec<u8>,
    include_seen: Arc<Mutex<Vec<String>>>,
}

impl MemoryArchiver {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![7u8; len],
            include_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn include_seen(&self) -> Vec<String> {
        self.include_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveBuilder for MemoryArchiver {
    async fn build(&self, _dir: &Path, include: &[String]) -> Result<ArchiveStream, CliError> {
        *self.include_seen.lock().unwrap() = include.to_vec();
        Ok(Box::pin(Cursor::new(self.bytes.clone())))
    }
}

/// Archiver that cannot start
pub struct BrokenArchiver;

#[async_trait]
impl ArchiveBuilder for BrokenArchiver {
    async fn build(&self, _dir: &Path, _include: &[String]) -> Result<ArchiveStream, CliError> {
        Err(CliError::ArchiveError("tar not found".to_string()))
    }
}

/// Gate rejecting every directory
pub struct RejectingGate;

#[async_trait]
impl DeployGate for RejectingGate {
    async fn check_allowed(&self, _dir: &Path) -> Result<(), CliError> {
        Err(CliError::GateRejected {
            reason: "no 'web' service defined".to_string(),
            remedy: "Add a web service".to_string(),
        })
    }
}

/// Cloneable in-memory writer
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn message(text: &str) -> Step {
    Step::Event(BuildStatusEvent::Message(text.to_string()))
}

/// Solve status with one transfer
pub fn transfer(id: &str, total: i64, current: i64) -> Step {
    let json = format!(
        r#"{{"Statuses":[{{"ID":"{}","Vertex":"sha256:v1","Total":{},"Current":{}}}]}}"#,
        id, total, current
    );
    Step::Event(BuildStatusEvent::Buildkit(json.into_bytes()))
}

/// Solve status with a failed step and its log output
pub fn failed_step(error: &str, log: &str) -> Step {
    let json = format!(
        r#"{{"Vertexes":[{{"Digest":"sha256:run","Name":"RUN make","Error":"{}"}}],
            "Logs":[{{"Vertex":"sha256:run","Stream":2,"Data":"{}"}}]}}"#,
        error,
        STANDARD.encode(log)
    );
    Step::Event(BuildStatusEvent::Buildkit(json.into_bytes()))
}

pub fn finish(version: &str) -> Step {
    Step::Finish(BuildOutput {
        version: version.to_string(),
        access_info: Some(AccessInfo {
            hostnames: vec!["shop.example.com".to_string()],
            default_route: false,
            cluster_hostname: String::new(),
        }),
    })
}

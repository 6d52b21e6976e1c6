//! Deploy orchestrator tests
//!
//! Every run uses scripted collaborators and paused time, so stall windows
//! and interrupts play out instantly.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use deploy_api::models::{DeploymentPhase, LockInfo};
use deployctl::deploy::archive::ArchiveBuilder;
use deployctl::deploy::build::BuildStatusEvent;
use deployctl::deploy::fsm::{DeployState, FailureKind};
use deployctl::deploy::gate::{AllowAll, DeployGate};
use deployctl::deploy::orchestrator::{
    Collaborators, DeployOrchestrator, DeployRun, Options, Target, CANCELLED_MESSAGE,
    MISSING_VERSION_MESSAGE, TIMEOUT_MESSAGE,
};
use deployctl::errors::CliError;
use deployctl::progress::explain::{self, ExplainRenderer};
use deployctl::progress::interactive::{self, InteractiveRenderer, Key};
use deployctl::progress::phase::{BUILD_PHASE, UPLOAD_PHASE};
use deployctl::progress::Presenter;
use futures::stream;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{
    failed_step, finish, message, transfer, BrokenArchiver, MemoryArchiver, RecordingStore,
    RejectingGate, ScriptedBuilder, SharedBuffer, Step, StoreCall,
};

const ARCHIVE_LEN: usize = 4096;

struct Setup {
    store: RecordingStore,
    builder: ScriptedBuilder,
    archiver: Arc<dyn ArchiveBuilder>,
    gate: Arc<dyn DeployGate>,
    stall_window: Duration,
    dir: TempDir,
}

impl Setup {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            store: RecordingStore::new(),
            builder: ScriptedBuilder::new(steps),
            archiver: Arc::new(MemoryArchiver::new(ARCHIVE_LEN)),
            gate: Arc::new(AllowAll),
            stall_window: Duration::from_secs(60),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn orchestrator(&self) -> DeployOrchestrator {
        DeployOrchestrator::new(
            Collaborators {
                store: Arc::new(self.store.clone()),
                builder: Arc::new(self.builder.clone()),
                archiver: self.archiver.clone(),
                gate: self.gate.clone(),
            },
            Target {
                app_name: "shop".to_string(),
                cluster_id: "prod".to_string(),
                dir: self.dir.path().to_path_buf(),
            },
            Options {
                stall_window: self.stall_window,
                failure_report_timeout: Duration::from_secs(5),
                inspect_git: false,
                ..Default::default()
            },
        )
    }

    fn explain(&self) -> (Box<dyn Presenter>, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::default();
        let side = SharedBuffer::default();
        let renderer = ExplainRenderer::new(
            explain::Options {
                stall_window: self.stall_window,
                ..Default::default()
            },
            Box::new(out.clone()),
            Box::new(side.clone()),
        );
        (Box::new(renderer), out, side)
    }

    fn interactive(&self, keys: impl futures::Stream<Item = Key> + Send + 'static) -> Box<dyn Presenter> {
        Box::new(InteractiveRenderer::headless(
            interactive::Options {
                stall_window: self.stall_window,
                ..Default::default()
            },
            keys,
        ))
    }

    async fn run_explain(&self) -> (DeployRun, String, String) {
        let (presenter, out, side) = self.explain();
        let run = self.orchestrator().run(presenter, CancellationToken::new()).await;
        (run, out.text(), side.text())
    }
}

fn write_app_config(dir: &Path, json: &str) {
    std::fs::create_dir_all(dir.join(".deployctl")).unwrap();
    std::fs::write(dir.join(".deployctl/app.json"), json).unwrap();
}

fn successful_build() -> Vec<Step> {
    vec![
        Step::Upload,
        message("Launching builder"),
        transfer("sha256:layer1", 1000, 400),
        transfer("sha256:layer1", 1000, 1000),
        finish("shop-v3"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_successful_deploy() {
    let setup = Setup::new(successful_build());
    let (run, out, side) = setup.run_explain().await;

    assert!(out.is_empty());
    assert_eq!(run.state(), DeployState::Active);
    assert_eq!(run.deployment_id.as_deref(), Some(common::DEPLOYMENT_ID));
    assert_eq!(
        run.fsm.history(),
        &[
            DeployState::Precheck,
            DeployState::Uploading,
            DeployState::Building,
            DeployState::Pushing,
            DeployState::Activating,
            DeployState::Active,
        ]
    );

    let report = run.into_result().unwrap();
    assert_eq!(report.version, "shop-v3");
    let phase_names: Vec<_> = report.phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(phase_names, vec![UPLOAD_PHASE, BUILD_PHASE]);
    assert_eq!(report.phases[1].details, "1 layers processed");

    assert_eq!(setup.builder.uploaded_bytes(), ARCHIVE_LEN);
    assert_eq!(setup.store.created(), 1);
    assert_eq!(setup.store.active_marks(), 1);
    assert!(setup.store.failure_marks().is_empty());
    assert_eq!(
        setup.store.phases(),
        vec![
            DeploymentPhase::Uploading,
            DeploymentPhase::Building,
            DeploymentPhase::Pushing,
            DeploymentPhase::Activating,
        ]
    );
    assert!(setup
        .store
        .calls()
        .iter()
        .any(|c| matches!(c, StoreCall::AppVersion(v) if v == "shop-v3")));

    assert!(side.contains("Build & push image"));
    assert!(side.contains("Upload complete"));
}

#[tokio::test(start_paused = true)]
async fn test_include_patterns_reach_archiver() {
    let mut setup = Setup::new(successful_build());
    let archiver = MemoryArchiver::new(ARCHIVE_LEN);
    setup.archiver = Arc::new(archiver.clone());
    write_app_config(setup.dir.path(), r#"{"include": ["dist/", "config/local.toml"]}"#);

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Active);
    assert_eq!(archiver.include_seen(), vec!["dist/", "config/local.toml"]);
}

#[tokio::test(start_paused = true)]
async fn test_gate_rejection_creates_no_record() {
    let mut setup = Setup::new(successful_build());
    setup.gate = Arc::new(RejectingGate);

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Aborted);
    assert!(run.deployment_id.is_none());
    assert!(matches!(run.result, Err(CliError::GateRejected { .. })));
    assert!(setup.store.calls().is_empty());
    assert_eq!(setup.builder.uploaded_bytes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_deployment_is_aborted() {
    let mut setup = Setup::new(successful_build());
    setup.store = RecordingStore::locked(LockInfo {
        blocking_deployment_id: "dep-41".to_string(),
        ..Default::default()
    });

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Aborted);
    assert!(matches!(run.result, Err(CliError::DeploymentBlocked(_))));
    assert_eq!(setup.store.created(), 1);
    assert!(setup.store.failure_marks().is_empty());
    assert_eq!(setup.store.active_marks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_upload_summary_recorded_once() {
    let setup = Setup::new(vec![
        Step::Upload,
        transfer("sha256:layer1", 500, 100),
        message("Launching builder"),
        transfer("sha256:layer2", 800, 800),
        message("Launching builder"),
        finish("shop-v4"),
    ]);

    let (run, _, side) = setup.run_explain().await;

    let report = run.into_result().unwrap();
    let uploads = report.phases.iter().filter(|p| p.name == UPLOAD_PHASE).count();
    assert_eq!(uploads, 1);
    assert_eq!(side.matches("Upload complete").count(), 1);
    assert_eq!(report.phases[1].details, "2 layers processed");
}

#[tokio::test(start_paused = true)]
async fn test_stall_marks_deployment_failed() {
    let mut setup = Setup::new(vec![Step::Upload, message("Launching builder"), Step::Hang]);
    setup.stall_window = Duration::from_secs(5);

    let started = tokio::time::Instant::now();
    let (run, _, _) = setup.run_explain().await;

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(run.state(), DeployState::Failed(FailureKind::Timeout));
    assert!(matches!(run.result, Err(CliError::StallTimeout(w)) if w == Duration::from_secs(5)));
    assert_eq!(setup.store.failure_message(), TIMEOUT_MESSAGE);
    assert_eq!(setup.store.active_marks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_progress_prevents_stall() {
    let mut setup = Setup::new(vec![
        Step::Upload,
        message("Launching builder"),
        transfer("sha256:layer1", 1000, 10),
        Step::Sleep(Duration::from_secs(30)),
        transfer("sha256:layer1", 1000, 1000),
        finish("shop-v5"),
    ]);
    setup.stall_window = Duration::from_secs(5);

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Active);
    assert!(setup.store.failure_marks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_during_build() {
    let setup = Setup::new(vec![Step::Upload, message("Launching builder"), Step::Hang]);
    let keys = stream::once(async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Key::Interrupt
    });
    let op = CancellationToken::new();

    let run = setup
        .orchestrator()
        .run(setup.interactive(keys), op.clone())
        .await;

    assert!(op.is_cancelled());
    assert!(run.fsm.history().contains(&DeployState::Building));
    assert_eq!(run.state(), DeployState::Failed(FailureKind::Cancelled));
    assert!(matches!(run.result, Err(CliError::Cancelled)));
    assert_eq!(setup.store.failure_message(), CANCELLED_MESSAGE);
    assert_eq!(setup.store.active_marks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_signal_cancels_explain_run() {
    let setup = Setup::new(vec![Step::Upload, message("Launching builder"), Step::Hang]);
    let root = CancellationToken::new();
    let signal = root.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        signal.cancel();
    });

    let (presenter, _, _) = setup.explain();
    let run = setup.orchestrator().run(presenter, root.child_token()).await;

    assert_eq!(run.state(), DeployState::Failed(FailureKind::Cancelled));
    assert_eq!(setup.store.failure_message(), CANCELLED_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_upload() {
    let setup = Setup::new(successful_build());
    let op = CancellationToken::new();
    op.cancel();

    let (presenter, _, _) = setup.explain();
    let run = setup.orchestrator().run(presenter, op).await;

    assert_eq!(run.state(), DeployState::Failed(FailureKind::Cancelled));
    assert_eq!(setup.builder.uploaded_bytes(), 0);
    assert_eq!(setup.store.failure_message(), CANCELLED_MESSAGE);
}

fn failing_build() -> Vec<Step> {
    vec![
        Step::Upload,
        message("Launching builder"),
        transfer("sha256:layer1", 300, 300),
        failed_step("process \\\"make\\\" did not complete: exit code: 2", "make: *** [all] Error 2"),
        Step::Event(BuildStatusEvent::Error("build step failed".to_string())),
        finish(""),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_renderers_agree_on_failed_build() {
    let explain_setup = Setup::new(failing_build());
    let (explain_run, _, _) = explain_setup.run_explain().await;

    let interactive_setup = Setup::new(failing_build());
    let interactive_run = interactive_setup
        .orchestrator()
        .run(
            interactive_setup.interactive(stream::pending()),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(explain_run.state(), DeployState::Failed(FailureKind::Build));
    assert_eq!(interactive_run.state(), explain_run.state());

    let (explain_errors, explain_logs) = match explain_run.result {
        Err(CliError::BuildFailed { errors, logs }) => (errors, logs),
        other => panic!("unexpected result: {:?}", other),
    };
    let (interactive_errors, interactive_logs) = match interactive_run.result {
        Err(CliError::BuildFailed { errors, logs }) => (errors, logs),
        other => panic!("unexpected result: {:?}", other),
    };
    assert_eq!(
        explain_errors,
        vec![
            "process \"make\" did not complete: exit code: 2".to_string(),
            "build step failed".to_string()
        ]
    );
    assert_eq!(explain_logs, vec!["make: *** [all] Error 2".to_string()]);
    assert_eq!(interactive_errors, explain_errors);
    assert_eq!(interactive_logs, explain_logs);

    let explain_message = explain_setup.store.failure_message();
    assert_eq!(
        explain_message,
        "Build failed: process \"make\" did not complete: exit code: 2; build step failed"
    );
    assert_eq!(interactive_setup.store.failure_message(), explain_message);
    assert_eq!(explain_setup.store.active_marks(), 0);
    assert_eq!(interactive_setup.store.active_marks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_version() {
    let setup = Setup::new(vec![
        Step::Upload,
        message("Launching builder"),
        transfer("sha256:layer1", 100, 100),
        finish(""),
    ]);

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Failed(FailureKind::MissingVersion));
    assert!(!run.fsm.history().contains(&DeployState::Activating));
    assert!(matches!(run.result, Err(CliError::MissingVersion)));
    assert_eq!(setup.store.failure_message(), MISSING_VERSION_MESSAGE);
    assert_eq!(setup.store.active_marks(), 0);
    assert!(!setup.store.phases().contains(&DeploymentPhase::Activating));
    assert!(!setup
        .store
        .calls()
        .iter()
        .any(|c| matches!(c, StoreCall::AppVersion(_))));
}

#[tokio::test(start_paused = true)]
async fn test_archive_failure() {
    let mut setup = Setup::new(successful_build());
    setup.archiver = Arc::new(BrokenArchiver);

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Failed(FailureKind::Archive));
    assert!(matches!(run.result, Err(CliError::ArchiveError(_))));
    assert!(setup.store.failure_message().starts_with("Failed to create tar:"));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_include_pattern() {
    let mut setup = Setup::new(successful_build());
    let archiver = MemoryArchiver::new(ARCHIVE_LEN);
    setup.archiver = Arc::new(archiver.clone());
    write_app_config(setup.dir.path(), r#"{"include": ["../secrets"]}"#);

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Failed(FailureKind::Archive));
    assert!(setup.store.failure_message().starts_with("Invalid include pattern:"));
    assert!(archiver.include_seen().is_empty());
    assert_eq!(setup.builder.uploaded_bytes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error() {
    let setup = Setup::new(vec![Step::Upload, Step::Fail("connection reset".to_string())]);

    let (run, _, _) = setup.run_explain().await;

    assert_eq!(run.state(), DeployState::Failed(FailureKind::Build));
    assert!(matches!(run.result, Err(CliError::TransportError(_))));
    assert_eq!(
        setup.store.failure_message(),
        "Build failed: Transport error: connection reset"
    );
}

//! Deployment record lifecycle tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use deploy_api::models::{
    CreateDeploymentResponse, DeploymentPhase, DeploymentStatus, LockInfo, PENDING_BUILD_VERSION,
};
use deployctl::deploy::lifecycle::LifecycleManager;
use deployctl::errors::CliError;

use common::{RecordingStore, StoreCall, DEPLOYMENT_ID};

const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

async fn created(store: &RecordingStore) -> LifecycleManager {
    LifecycleManager::create(Arc::new(store.clone()), "shop", "prod", None, REPORT_TIMEOUT)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_uses_pending_placeholder() {
    let store = RecordingStore::new();
    let lifecycle = created(&store).await;

    assert_eq!(lifecycle.id(), DEPLOYMENT_ID);
    assert_eq!(lifecycle.terminal_status(), None);
    match &store.calls()[0] {
        StoreCall::Create(request) => {
            assert_eq!(request.app_name, "shop");
            assert_eq!(request.cluster_id, "prod");
            assert_eq!(request.app_version_id, PENDING_BUILD_VERSION);
        }
        other => panic!("unexpected call: {:?}", other),
    }
}

#[tokio::test]
async fn test_create_blocked_by_lock() {
    let store = RecordingStore::locked(LockInfo {
        blocking_deployment_id: "dep-41".to_string(),
        ..Default::default()
    });

    let err = LifecycleManager::create(Arc::new(store), "shop", "prod", None, REPORT_TIMEOUT)
        .await
        .unwrap_err();

    match err {
        CliError::DeploymentBlocked(lock) => assert_eq!(lock.blocking_deployment_id, "dep-41"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_create_rejected_or_empty() {
    let rejected = RecordingStore::new().with_create_response(CreateDeploymentResponse {
        error: Some("app not found".to_string()),
        ..Default::default()
    });
    let err = LifecycleManager::create(Arc::new(rejected), "shop", "prod", None, REPORT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::StoreError(ref m) if m == "app not found"));

    let empty = RecordingStore::new().with_create_response(CreateDeploymentResponse::default());
    let err = LifecycleManager::create(Arc::new(empty), "shop", "prod", None, REPORT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::StoreError(_)));
}

#[tokio::test]
async fn test_phase_only_moves_forward() {
    let store = RecordingStore::new();
    let lifecycle = created(&store).await;

    lifecycle.advance_phase(DeploymentPhase::Uploading).await;
    lifecycle.advance_phase(DeploymentPhase::Building).await;
    lifecycle.advance_phase(DeploymentPhase::Building).await;
    lifecycle.advance_phase(DeploymentPhase::Uploading).await;
    lifecycle.advance_phase(DeploymentPhase::Pushing).await;

    assert_eq!(
        store.phases(),
        vec![
            DeploymentPhase::Uploading,
            DeploymentPhase::Building,
            DeploymentPhase::Pushing
        ]
    );
}

#[tokio::test]
async fn test_terminal_status_is_claimed_once() {
    let store = RecordingStore::new();
    let lifecycle = created(&store).await;

    assert!(lifecycle.mark_active().await);
    assert!(!lifecycle.mark_failed("late failure", &[], &[]).await);
    assert!(!lifecycle.mark_active().await);

    assert_eq!(lifecycle.terminal_status(), Some(DeploymentStatus::Active));
    assert_eq!(store.active_marks(), 1);
    assert!(store.failure_marks().is_empty());
}

#[tokio::test]
async fn test_mark_failed_reports_logs_or_errors() {
    let store = RecordingStore::new();
    let lifecycle = created(&store).await;
    let logs = vec!["step 1".to_string(), "step 2".to_string()];
    lifecycle
        .mark_failed("Build failed: boom", &logs, &["boom".to_string()])
        .await;
    match &store.failure_marks()[..] {
        [StoreCall::Failed { message, logs }] => {
            assert_eq!(message, "Build failed: boom");
            assert_eq!(logs, "step 1\nstep 2");
        }
        other => panic!("unexpected calls: {:?}", other),
    }

    let store = RecordingStore::new();
    let lifecycle = created(&store).await;
    let errors = vec!["exit code: 2".to_string(), "missing file".to_string()];
    lifecycle.mark_failed("Build failed", &[], &errors).await;
    match &store.failure_marks()[..] {
        [StoreCall::Failed { logs, .. }] => assert_eq!(logs, "exit code: 2\nmissing file"),
        other => panic!("unexpected calls: {:?}", other),
    }
    assert_eq!(lifecycle.terminal_status(), Some(DeploymentStatus::Failed));
}

#[tokio::test]
async fn test_mark_failed_falls_back_to_status_update() {
    let store = RecordingStore::new().failing_rich_update();
    let lifecycle = created(&store).await;

    assert!(lifecycle.mark_failed("Deploy cancelled by user", &[], &[]).await);

    match &store.failure_marks()[..] {
        [StoreCall::Status(DeploymentStatus::Failed, Some(message))] => {
            assert_eq!(message, "Deploy cancelled by user");
        }
        other => panic!("unexpected calls: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_failure_report_is_bounded() {
    let store = RecordingStore::new().slow_failure_report(Duration::from_secs(300));
    let lifecycle = LifecycleManager::create(
        Arc::new(store.clone()),
        "shop",
        "prod",
        None,
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    let started = tokio::time::Instant::now();
    assert!(lifecycle.mark_failed("Buildkit startup timeout", &[], &[]).await);

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(store.failure_marks().is_empty());
    assert_eq!(lifecycle.terminal_status(), Some(DeploymentStatus::Failed));
}

//! FSM unit tests

use deployctl::deploy::fsm::{DeployEvent, DeployFsm, DeployState, FailureKind};

fn fsm_in(events: &[DeployEvent]) -> DeployFsm {
    let mut fsm = DeployFsm::new();
    for event in events {
        fsm.process(event.clone()).unwrap();
    }
    fsm
}

#[test]
fn test_fsm_initial_state() {
    let fsm = DeployFsm::new();
    assert_eq!(fsm.state(), DeployState::Precheck);
    assert_eq!(fsm.history(), &[DeployState::Precheck]);
    assert!(!fsm.state().is_terminal());
}

#[test]
fn test_fsm_success_flow() {
    let fsm = fsm_in(&[
        DeployEvent::GatePassed,
        DeployEvent::BuilderStarted,
        DeployEvent::BuildSucceeded,
        DeployEvent::VersionAttached,
        DeployEvent::Activated,
    ]);

    assert_eq!(
        fsm.history(),
        &[
            DeployState::Precheck,
            DeployState::Uploading,
            DeployState::Building,
            DeployState::Pushing,
            DeployState::Activating,
            DeployState::Active,
        ]
    );
}

#[test]
fn test_fsm_gate_failure_aborts() {
    let fsm = fsm_in(&[DeployEvent::GateFailed]);
    assert_eq!(fsm.state(), DeployState::Aborted);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_archive_failure() {
    let fsm = fsm_in(&[DeployEvent::GatePassed, DeployEvent::ArchiveFailed]);
    assert_eq!(fsm.state(), DeployState::Failed(FailureKind::Archive));
}

#[test]
fn test_fsm_build_failure_before_and_after_builder_start() {
    let fsm = fsm_in(&[DeployEvent::GatePassed, DeployEvent::BuildFailed]);
    assert_eq!(fsm.state(), DeployState::Failed(FailureKind::Build));

    let fsm = fsm_in(&[
        DeployEvent::GatePassed,
        DeployEvent::BuilderStarted,
        DeployEvent::BuildFailed,
    ]);
    assert_eq!(fsm.state(), DeployState::Failed(FailureKind::Build));
}

#[test]
fn test_fsm_missing_version() {
    let mut fsm = fsm_in(&[
        DeployEvent::GatePassed,
        DeployEvent::BuilderStarted,
        DeployEvent::BuildSucceeded,
        DeployEvent::VersionMissing,
    ]);
    assert_eq!(fsm.state(), DeployState::Failed(FailureKind::MissingVersion));
    assert!(fsm.process(DeployEvent::VersionAttached).is_err());
    assert!(!fsm.history().contains(&DeployState::Activating));
}

#[test]
fn test_fsm_interrupt_from_every_active_state() {
    let prefixes: [&[DeployEvent]; 4] = [
        &[DeployEvent::GatePassed],
        &[DeployEvent::GatePassed, DeployEvent::BuilderStarted],
        &[
            DeployEvent::GatePassed,
            DeployEvent::BuilderStarted,
            DeployEvent::BuildSucceeded,
        ],
        &[
            DeployEvent::GatePassed,
            DeployEvent::BuilderStarted,
            DeployEvent::BuildSucceeded,
            DeployEvent::VersionAttached,
        ],
    ];
    for prefix in prefixes {
        let mut fsm = fsm_in(prefix);
        fsm.process(DeployEvent::Interrupted).unwrap();
        assert_eq!(fsm.state(), DeployState::Failed(FailureKind::Cancelled));
    }
}

#[test]
fn test_fsm_interrupt_not_allowed_before_record() {
    let mut fsm = DeployFsm::new();
    assert!(fsm.process(DeployEvent::Interrupted).is_err());
    assert_eq!(fsm.state(), DeployState::Precheck);
}

#[test]
fn test_fsm_stall_only_while_building() {
    let mut fsm = fsm_in(&[DeployEvent::GatePassed]);
    assert!(fsm.process(DeployEvent::Stalled).is_err());

    fsm.process(DeployEvent::BuilderStarted).unwrap();
    fsm.process(DeployEvent::Stalled).unwrap();
    assert_eq!(fsm.state(), DeployState::Failed(FailureKind::Timeout));
}

#[test]
fn test_fsm_invalid_transition_keeps_state() {
    let mut fsm = fsm_in(&[DeployEvent::GatePassed]);
    let result = fsm.process(DeployEvent::Activated);
    assert!(result.is_err());
    assert_eq!(fsm.state(), DeployState::Uploading);
    assert_eq!(fsm.history().len(), 2);
}

#[test]
fn test_fsm_state_serializes_with_reason() {
    let json = serde_json::to_value(DeployState::Failed(FailureKind::Timeout)).unwrap();
    assert_eq!(json["state"], "failed");
    assert_eq!(json["reason"], "timeout");
}

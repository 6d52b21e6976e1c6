//! Finite State Machine for a deploy run

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a deploy run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// App config or archive could not be produced
    Archive,
    /// Transport or remote build error
    Build,
    /// The build never started moving
    Timeout,
    /// The build succeeded without producing a version
    MissingVersion,
    /// User interrupt or process signal
    Cancelled,
}

/// Deploy run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum DeployState {
    /// Gate check, nothing recorded yet
    Precheck,

    /// Record created, source archive streaming
    Uploading,

    /// Builder launched
    Building,

    /// Build finished, image being published
    Pushing,

    /// Version attached, rollout in progress
    Activating,

    /// Terminal success
    Active,

    /// Terminal failure
    Failed(FailureKind),

    /// Gate rejected the directory or the record was refused; no record exists
    Aborted,
}

impl DeployState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Active | DeployState::Failed(_) | DeployState::Aborted)
    }
}

/// Deploy run event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    /// Gate check passed and the record was created
    GatePassed,

    /// Gate check failed or the record could not be created
    GateFailed,

    /// App config or archive failed before the builder started
    ArchiveFailed,

    /// "Launching builder" seen or first transfer observed
    BuilderStarted,

    /// No build activity within the stall window
    Stalled,

    /// Transport error or build errors
    BuildFailed,

    /// Build returned
    BuildSucceeded,

    /// Build returned without a version
    VersionMissing,

    /// Version attached and activation requested
    VersionAttached,

    /// Deployment marked active
    Activated,

    /// User interrupt or process signal
    Interrupted,
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployState::Failed(kind) => write!(f, "Failed({:?})", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Deploy FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    state: DeployState,
    history: Vec<DeployState>,
}

impl DeployFsm {
    /// Create a new FSM in precheck state
    pub fn new() -> Self {
        Self {
            state: DeployState::Precheck,
            history: vec![DeployState::Precheck],
        }
    }

    /// Get current state
    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Every state entered, in order
    pub fn history(&self) -> &[DeployState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployEvent) -> Result<DeployState, String> {
        use DeployEvent as E;
        use DeployState as S;

        let new_state = match (self.state, &event) {
            // From Precheck
            (S::Precheck, E::GateFailed) => S::Aborted,
            (S::Precheck, E::GatePassed) => S::Uploading,

            // From Uploading
            (S::Uploading, E::ArchiveFailed) => S::Failed(FailureKind::Archive),
            (S::Uploading, E::BuilderStarted) => S::Building,
            (S::Uploading, E::BuildFailed) => S::Failed(FailureKind::Build),

            // From Building
            (S::Building, E::Stalled) => S::Failed(FailureKind::Timeout),
            (S::Building, E::BuildFailed) => S::Failed(FailureKind::Build),
            (S::Building, E::BuildSucceeded) => S::Pushing,

            // From Pushing
            (S::Pushing, E::VersionMissing) => S::Failed(FailureKind::MissingVersion),
            (S::Pushing, E::VersionAttached) => S::Activating,

            // From Activating
            (S::Activating, E::Activated) => S::Active,

            // Interrupt from any active state
            (S::Uploading | S::Building | S::Pushing | S::Activating, E::Interrupted) => {
                S::Failed(FailureKind::Cancelled)
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}

//! API models

pub mod analysis;
pub mod build;
pub mod deployment;
pub mod solve;

pub use analysis::{AnalyzedService, AppAnalysis, DetectionEvent};
pub use build::{AccessInfo, BuildFrame, BuildOutput};
pub use deployment::{
    CreateDeploymentRequest, CreateDeploymentResponse, DeploymentPhase, DeploymentRecord,
    DeploymentStatus, GitInfo, LockInfo, UpdateAppVersionRequest, UpdateFailedRequest,
    UpdatePhaseRequest, UpdateStatusRequest, PENDING_BUILD_VERSION,
};
pub use solve::{SolveStatus, Vertex, VertexLog, VertexStatus};

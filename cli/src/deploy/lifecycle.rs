//! Deployment record lifecycle
//!
//! Owns the single deployment record of a run. Creation is fatal on failure;
//! phase, version and activation updates are best effort; the failure report
//! runs detached from the operation so it still lands after a cancellation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deploy_api::models::{
    CreateDeploymentRequest, CreateDeploymentResponse, DeploymentPhase, DeploymentStatus, GitInfo,
    PENDING_BUILD_VERSION,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::CliError;

/// Remote store of deployment records
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn create(&self, request: CreateDeploymentRequest) -> Result<CreateDeploymentResponse, CliError>;

    async fn update_phase(&self, id: &str, phase: DeploymentPhase) -> Result<(), CliError>;

    async fn update_app_version(&self, id: &str, version: &str) -> Result<(), CliError>;

    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
        error_message: Option<&str>,
    ) -> Result<(), CliError>;

    async fn update_failed(&self, id: &str, error_message: &str, build_logs: &str) -> Result<(), CliError>;
}

const TERMINAL_NONE: u8 = 0;
const TERMINAL_ACTIVE: u8 = 1;
const TERMINAL_FAILED: u8 = 2;

/// Handle on the deployment record of the current run
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn DeploymentStore>,
    id: String,
    // last phase written; the lock also orders concurrent writes
    phase: Mutex<Option<DeploymentPhase>>,
    terminal: AtomicU8,
    failure_report_timeout: Duration,
}

impl LifecycleManager {
    /// Create the record with the pending version placeholder
    pub async fn create(
        store: Arc<dyn DeploymentStore>,
        app_name: &str,
        cluster_id: &str,
        git_info: Option<GitInfo>,
        failure_report_timeout: Duration,
    ) -> Result<Self, CliError> {
        let request = CreateDeploymentRequest {
            app_name: app_name.to_string(),
            cluster_id: cluster_id.to_string(),
            app_version_id: PENDING_BUILD_VERSION.to_string(),
            git_info,
        };

        let response = store.create(request).await?;
        if let Some(lock) = response.lock_info {
            return Err(CliError::DeploymentBlocked(lock));
        }
        if let Some(err) = response.error.filter(|e| !e.is_empty()) {
            return Err(CliError::StoreError(err));
        }
        let record = response
            .deployment
            .ok_or_else(|| CliError::StoreError("no deployment record returned".to_string()))?;

        info!(deployment_id = %record.id, app = %app_name, "deployment record created");

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                id: record.id,
                phase: Mutex::new(None),
                terminal: AtomicU8::new(TERMINAL_NONE),
                failure_report_timeout,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Terminal status reached by this run, if any
    pub fn terminal_status(&self) -> Option<DeploymentStatus> {
        match self.inner.terminal.load(Ordering::SeqCst) {
            TERMINAL_ACTIVE => Some(DeploymentStatus::Active),
            TERMINAL_FAILED => Some(DeploymentStatus::Failed),
            _ => None,
        }
    }

    /// Move the advisory phase forward. Backward or repeated requests are
    /// ignored; store errors are logged.
    pub async fn advance_phase(&self, phase: DeploymentPhase) {
        let mut current = self.inner.phase.lock().await;
        if current.is_some_and(|c| c >= phase) {
            debug!(%phase, "phase already reached, skipping update");
            return;
        }
        match self.inner.store.update_phase(&self.inner.id, phase).await {
            Ok(()) => debug!(deployment_id = %self.inner.id, %phase, "phase updated"),
            Err(e) => error!(deployment_id = %self.inner.id, %phase, "failed to update deployment phase: {}", e),
        }
        *current = Some(phase);
    }

    /// Replace the version placeholder. Store errors are logged.
    pub async fn attach_version(&self, version: &str) {
        if let Err(e) = self.inner.store.update_app_version(&self.inner.id, version).await {
            error!(deployment_id = %self.inner.id, version, "failed to update deployment app version: {}", e);
        }
    }

    /// Record success. Has no effect once a terminal status was recorded.
    pub async fn mark_active(&self) -> bool {
        if !self.claim_terminal(TERMINAL_ACTIVE) {
            return false;
        }
        if let Err(e) = self
            .inner
            .store
            .update_status(&self.inner.id, DeploymentStatus::Active, None)
            .await
        {
            error!(deployment_id = %self.inner.id, "failed to mark deployment active: {}", e);
        }
        true
    }

    /// Record failure with the build output.
    ///
    /// Runs on its own task under its own deadline, so it completes even
    /// when the operation that triggered it was cancelled. When `logs` is
    /// empty the collected build errors are reported instead. Has no effect
    /// once a terminal status was recorded.
    pub async fn mark_failed(&self, message: &str, logs: &[String], errors: &[String]) -> bool {
        if !self.claim_terminal(TERMINAL_FAILED) {
            return false;
        }

        let build_logs = if logs.is_empty() {
            errors.join("\n")
        } else {
            logs.join("\n")
        };
        let inner = self.inner.clone();
        let message = message.to_string();

        let report = tokio::spawn(async move {
            let deadline = inner.failure_report_timeout;
            let write = async {
                match inner.store.update_failed(&inner.id, &message, &build_logs).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!(deployment_id = %inner.id, "failed to record failure details, falling back to status update: {}", e);
                        inner
                            .store
                            .update_status(&inner.id, DeploymentStatus::Failed, Some(&message))
                            .await
                    }
                }
            };
            match tokio::time::timeout(deadline, write).await {
                Ok(Ok(())) => info!(deployment_id = %inner.id, "deployment marked failed"),
                Ok(Err(e)) => error!(deployment_id = %inner.id, "failed to mark deployment failed: {}", e),
                Err(_) => error!(deployment_id = %inner.id, ?deadline, "timed out marking deployment failed"),
            }
        });

        if let Err(e) = report.await {
            error!(deployment_id = %self.inner.id, "failure report task aborted: {}", e);
        }
        true
    }

    fn claim_terminal(&self, status: u8) -> bool {
        match self.inner.terminal.compare_exchange(
            TERMINAL_NONE,
            status,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => true,
            Err(existing) => {
                warn!(
                    deployment_id = %self.inner.id,
                    existing, requested = status,
                    "deployment already has a terminal status, ignoring"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("id", &self.inner.id)
            .field("terminal", &self.terminal_status())
            .finish()
    }
}

//! Deployment record API client

use async_trait::async_trait;
use deploy_api::models::{
    CreateDeploymentRequest, CreateDeploymentResponse, DeploymentPhase, DeploymentStatus,
    UpdateAppVersionRequest, UpdateFailedRequest, UpdatePhaseRequest, UpdateStatusRequest,
};

use crate::deploy::lifecycle::DeploymentStore;
use crate::errors::CliError;
use crate::http::client::HttpClient;

/// [`DeploymentStore`] backed by the cluster API
#[derive(Debug, Clone)]
pub struct HttpDeploymentStore {
    client: HttpClient,
}

impl HttpDeploymentStore {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeploymentStore for HttpDeploymentStore {
    async fn create(&self, request: CreateDeploymentRequest) -> Result<CreateDeploymentResponse, CliError> {
        self.client.post("/deployments", &request).await
    }

    async fn update_phase(&self, id: &str, phase: DeploymentPhase) -> Result<(), CliError> {
        let path = format!("/deployments/{}/phase", id);
        self.client.patch(&path, &UpdatePhaseRequest { phase }).await
    }

    async fn update_app_version(&self, id: &str, version: &str) -> Result<(), CliError> {
        let path = format!("/deployments/{}/app-version", id);
        let body = UpdateAppVersionRequest {
            app_version_id: version.to_string(),
        };
        self.client.patch(&path, &body).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
        error_message: Option<&str>,
    ) -> Result<(), CliError> {
        let path = format!("/deployments/{}/status", id);
        let body = UpdateStatusRequest {
            status,
            error_message: error_message.map(str::to_string),
        };
        self.client.patch(&path, &body).await
    }

    async fn update_failed(&self, id: &str, error_message: &str, build_logs: &str) -> Result<(), CliError> {
        let path = format!("/deployments/{}/failed", id);
        let body = UpdateFailedRequest {
            error_message: error_message.to_string(),
            build_logs: build_logs.to_string(),
        };
        self.client.post_unit(&path, &body).await
    }
}

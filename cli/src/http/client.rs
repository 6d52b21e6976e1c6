//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::CliError;

/// HTTP client for the cluster API
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client. `timeout` bounds plain JSON requests; the
    /// streamed build request has no overall deadline.
    pub fn new(base_url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self, CliError> {
        let client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the endpoint made of `segments`, each one percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, CliError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CliError::ConfigError(format!("invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| CliError::ConfigError(format!("base URL cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Build a request against `path` with authentication applied
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.authorize(self.client.request(method, &url))
    }

    /// Build a request against a full endpoint URL with authentication applied
    pub fn request_url(&self, method: reqwest::Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, CliError> {
        let response = self
            .send(self.request(reqwest::Method::POST, path).timeout(self.timeout).json(body), "POST")
            .await?;
        Ok(response.json().await?)
    }

    /// Make a POST request, ignoring the response body
    pub async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), CliError> {
        self.send(self.request(reqwest::Method::POST, path).timeout(self.timeout).json(body), "POST")
            .await?;
        Ok(())
    }

    /// Make a PATCH request, ignoring the response body
    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> Result<(), CliError> {
        self.send(self.request(reqwest::Method::PATCH, path).timeout(self.timeout).json(body), "PATCH")
            .await?;
        Ok(())
    }

    /// Send a request and turn a non-success status into an error
    pub async fn send(&self, request: RequestBuilder, method: &str) -> Result<Response, CliError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed: {} - {}", method, status, body);
            return Err(CliError::TransportError(format!("{}: {}", status, body.trim())));
        }
        Ok(response)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

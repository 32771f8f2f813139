//! Drive-style HTTP implementation of RemoteDocumentStore
//!
//! Talks to a Drive v3 shaped API, keeping the document in the
//! application-private `appDataFolder` space. Every request carries the
//! session's bearer credential; a 401/403 answer clears it, triggers one
//! silent refresh and exactly one retry of the request. Rate-limit and
//! quota 403s are left to the caller's retry policy.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use crate::{RemoteDocumentStore, RemoteFile, StoreError, StoreResult, TokenProvider};

/// Configuration for the Drive client
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Base URL of the API, without a trailing slash
    pub api_base_url: String,
    /// Storage space documents are created in and searched
    pub space: String,
    /// Timeout in seconds for HTTP requests
    pub timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com".to_string(),
            space: "appDataFolder".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Drive implementation of RemoteDocumentStore
#[derive(Debug, Clone)]
pub struct DriveDocumentStore {
    config: DriveConfig,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl DriveDocumentStore {
    /// Create a new DriveDocumentStore sharing the session's token provider
    pub fn new(config: DriveConfig, tokens: Arc<dyn TokenProvider>) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::ConfigurationError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    fn files_endpoint(&self) -> String {
        format!("{}/drive/v3/files", self.config.api_base_url)
    }

    fn file_endpoint(&self, id: &str) -> String {
        format!("{}/drive/v3/files/{}", self.config.api_base_url, id)
    }

    fn upload_endpoint(&self, id: &str) -> String {
        format!("{}/upload/drive/v3/files/{}", self.config.api_base_url, id)
    }

    /// Drive query for a non-trashed file with exactly this name
    fn name_query(name: &str) -> String {
        let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
        format!("name = '{}' and trashed = false", escaped)
    }

    /// Maps a transport error to a StoreError
    fn map_http_error(error: reqwest::Error) -> StoreError {
        if error.is_timeout() {
            StoreError::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            StoreError::Network(error.to_string())
        } else {
            StoreError::BackendError(format!("HTTP error: {}", error))
        }
    }

    async fn bearer(&self) -> StoreResult<String> {
        match self.tokens.request_credential(false).await? {
            Some(token) => Ok(token.secret().to_string()),
            None => Err(StoreError::AuthRequired),
        }
    }

    /// Send a request built by `build`, refreshing the credential once if
    /// the backend rejects it. A 403 carrying a rate-limit or quota reason
    /// is a throttled request, not a rejection, and comes back as an HTTP
    /// error without touching the credential.
    async fn send_authorized<F>(&self, operation: &str, build: F) -> StoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.bearer().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(Self::map_http_error)?;

        let status = match Self::screen(operation, response).await? {
            Screened::Accepted(response) => return Ok(response),
            Screened::Rejected { status, .. } => status,
        };

        warn!(operation, %status, "credential rejected, refreshing");
        self.tokens.clear();
        let token = self.bearer().await.map_err(|e| match e {
            StoreError::AuthRequired => {
                StoreError::Auth(format!("{}: credential expired", operation))
            }
            other => other,
        })?;

        let response = build(&token)
            .send()
            .await
            .map_err(Self::map_http_error)?;

        match Self::screen(operation, response).await? {
            Screened::Accepted(response) => Ok(response),
            Screened::Rejected { status, body } => {
                error!(operation, %status, "credential rejected after refresh");
                Err(StoreError::Auth(format!(
                    "{}: status {}, error: {}",
                    operation, status, body
                )))
            }
        }
    }

    /// Split 401/403 answers into throttling (returned as an error) and
    /// credential rejections; everything else passes through untouched.
    async fn screen(operation: &str, response: Response) -> StoreResult<Screened> {
        let status = response.status();
        if !is_auth_rejection(status) {
            return Ok(Screened::Accepted(response));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::FORBIDDEN && is_throttling_reason(&body) {
            warn!(operation, "request throttled by backend");
            return Err(StoreError::Http {
                status: status.as_u16(),
                message: format!("{} rate limited: {}", operation, body),
            });
        }
        Ok(Screened::Rejected { status, body })
    }

    async fn failure(operation: &str, response: Response) -> StoreError {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        error!(operation, %status, "request failed: {}", error_text);
        StoreError::Http {
            status: status.as_u16(),
            message: format!("{} failed: {}", operation, error_text),
        }
    }
}

/// Drive error reasons reported with a 403 that mean "slow down"
const THROTTLING_REASONS: &[&str] = &[
    "userratelimitexceeded",
    "ratelimitexceeded",
    "quotaexceeded",
    "dailylimitexceeded",
];

enum Screened {
    Accepted(Response),
    Rejected { status: StatusCode, body: String },
}

fn is_throttling_reason(body: &str) -> bool {
    let body = body.to_lowercase();
    THROTTLING_REASONS.iter().any(|reason| body.contains(reason))
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[async_trait]
impl RemoteDocumentStore for DriveDocumentStore {
    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<RemoteFile>> {
        let url = self.files_endpoint();
        let query = Self::name_query(name);
        let response = self
            .send_authorized("find", |token| {
                self.client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[
                        ("q", query.as_str()),
                        ("spaces", self.config.space.as_str()),
                        ("fields", "files(id,name)"),
                        ("pageSize", "1"),
                    ])
            })
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure("find", response).await);
        }

        let list: FileList = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        let found = list.files.into_iter().next();
        debug!(found = found.is_some(), "document lookup finished");
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn create(&self, name: &str) -> StoreResult<String> {
        let url = self.files_endpoint();
        let body = json!({
            "name": name,
            "parents": [self.config.space],
            "mimeType": "application/json",
        });
        let response = self
            .send_authorized("create", |token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("fields", "id")])
                    .json(&body)
            })
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure("create", response).await);
        }

        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        debug!(id = %created.id, "created document");
        Ok(created.id)
    }

    #[instrument(skip(self))]
    async fn read(&self, id: &str) -> StoreResult<Option<String>> {
        let url = self.file_endpoint(id);
        let response = self
            .send_authorized("read", |token| {
                self.client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("alt", "media")])
            })
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("document not found");
                Ok(None)
            }
            status if status.is_success() => response
                .text()
                .await
                .map(Some)
                .map_err(Self::map_http_error),
            _ => Err(Self::failure("read", response).await),
        }
    }

    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn write(&self, id: &str, payload: &str) -> StoreResult<()> {
        let url = self.upload_endpoint(id);
        let response = self
            .send_authorized("write", |token| {
                self.client
                    .patch(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "media")])
                    .header("Content-Type", "application/json")
                    .body(payload.to_string())
            })
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure("write", response).await);
        }
        debug!("document written");
        Ok(())
    }
}

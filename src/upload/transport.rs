use super::error::UploadError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Recording descriptor sent alongside the artifact bytes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub record_id: String,
    pub user_id: Option<String>,
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
    /// `sha256:<hex>` of the artifact, when it could be computed locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// What the server reports about a previously transmitted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusProbe {
    /// Durably stored server-side, optionally with the server's checksum.
    Persisted { checksum: Option<String> },
    Processing,
    Failed { error: String },
    /// The server has no status endpoint; only trust-based verification is
    /// possible.
    Unsupported,
}

/// Wire seam for uploads. One implementation per backend; the verifier and
/// queue never touch HTTP directly.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Transmit the artifact; returns the server-assigned audio file id.
    async fn transmit(
        &self,
        artifact: &Path,
        metadata: &UploadMetadata,
        token: &str,
    ) -> Result<String, UploadError>;

    /// Ask the server whether a transmitted upload is durably stored.
    async fn probe_status(&self, audio_file_id: &str) -> Result<StatusProbe, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(alias = "audioFileId", alias = "id")]
    audio_file_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    checksum: Option<String>,
    error: Option<String>,
}

/// Baseline floor for the request timeout; large artifacts scale it up.
const MIN_TIMEOUT: Duration = Duration::from_secs(600);
const SECS_PER_10MB: u64 = 60;

/// HTTP implementation: multipart `POST {api_url}/upload` with bearer auth,
/// `GET {api_url}/upload/{id}/status` for confirmation.
pub struct HttpUploadTransport {
    client: reqwest::Client,
    api_url: String,
}

impl HttpUploadTransport {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build upload HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    /// One minute per 10 MB, never below the floor. A meeting-length artifact
    /// over a hotel uplink must not be killed by a generic request timeout.
    fn upload_timeout(size: u64) -> Duration {
        let scaled = Duration::from_secs((size / (10 * 1024 * 1024)) * SECS_PER_10MB);
        scaled.max(MIN_TIMEOUT)
    }
}

fn transport_err(e: reqwest::Error) -> UploadError {
    UploadError::Transport(e.to_string())
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn transmit(
        &self,
        artifact: &Path,
        metadata: &UploadMetadata,
        token: &str,
    ) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(artifact)
            .await
            .map_err(|e| UploadError::Transport(format!("Failed to read artifact: {e}")))?;
        let size = bytes.len() as u64;

        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| UploadError::Transport(format!("Failed to encode metadata: {e}")))?;
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.bin".to_string());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(transport_err)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("metadata", metadata_json);

        debug!(
            "Transmitting {} ({} bytes, timeout {:?})",
            metadata.record_id,
            size,
            Self::upload_timeout(size)
        );
        let response = self
            .client
            .post(format!("{}/upload", self.api_url))
            .bearer_auth(token)
            .multipart(form)
            .timeout(Self::upload_timeout(size))
            .send()
            .await
            .map_err(transport_err)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(UploadError::Unauthorized),
            StatusCode::FORBIDDEN => return Err(UploadError::Forbidden),
            StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(UploadError::InvalidFormat)
            }
            status if !status.is_success() => {
                return Err(UploadError::Transport(format!(
                    "Server returned {status}"
                )))
            }
            _ => {}
        }

        let body: UploadResponse = response.json().await.map_err(transport_err)?;
        Ok(body.audio_file_id)
    }

    async fn probe_status(&self, audio_file_id: &str) -> Result<StatusProbe, UploadError> {
        let response = self
            .client
            .get(format!("{}/upload/{audio_file_id}/status", self.api_url))
            .send()
            .await
            .map_err(transport_err)?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(StatusProbe::Unsupported),
            StatusCode::UNAUTHORIZED => return Err(UploadError::Unauthorized),
            status if !status.is_success() => {
                return Err(UploadError::Transport(format!(
                    "Status probe returned {status}"
                )))
            }
            _ => {}
        }

        let body: StatusResponse = response.json().await.map_err(transport_err)?;
        Ok(match body.status.as_str() {
            "persisted" | "completed" | "stored" => StatusProbe::Persisted {
                checksum: body.checksum,
            },
            "failed" | "error" => StatusProbe::Failed {
                error: body
                    .error
                    .unwrap_or_else(|| "Server reported upload failure".to_string()),
            },
            _ => StatusProbe::Processing,
        })
    }
}

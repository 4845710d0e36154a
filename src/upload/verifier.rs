use super::error::{is_retryable_error, UploadError};
use super::transport::{StatusProbe, UploadMetadata, UploadTransport};
use crate::integrity;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Host-supplied token refresh, invoked at most once per upload on an auth
/// rejection.
#[async_trait]
pub trait TokenRefresh: Send + Sync {
    async fn refresh(&self) -> Result<String, UploadError>;
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Full upload attempts beyond the first in `upload_with_retry`.
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Status-probe attempts after transmit.
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            poll_attempts: 15,
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Result of a verified upload.
///
/// `can_delete` is the one field deletion logic may consult: it is true only
/// when the server confirmed durable storage (or confirmation is impossible
/// and we degrade to trust) and no checksum contradiction was seen.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub success: bool,
    pub audio_file_id: Option<String>,
    pub can_delete: bool,
    pub verified: bool,
    /// True when the server cannot confirm uploads and we fell back to
    /// trusting the transmit response.
    pub fallback: bool,
    pub error: Option<String>,
}

impl UploadOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            audio_file_id: None,
            can_delete: false,
            verified: false,
            fallback: false,
            error: Some(error.into()),
        }
    }
}

/// Two-phase upload: transmit, then confirm server-side persistence before
/// anything local may be deleted.
pub struct UploadVerifier {
    transport: Arc<dyn UploadTransport>,
    token_refresh: Option<Arc<dyn TokenRefresh>>,
    config: UploadConfig,
}

impl UploadVerifier {
    pub fn new(transport: Arc<dyn UploadTransport>, config: UploadConfig) -> Self {
        Self {
            transport,
            token_refresh: None,
            config,
        }
    }

    pub fn with_token_refresh(mut self, refresh: Arc<dyn TokenRefresh>) -> Self {
        self.token_refresh = Some(refresh);
        self
    }

    /// Upload one artifact with verification.
    ///
    /// Phase 1 computes a local `sha256:` checksum; a read failure here is
    /// tolerated and downgrades verification to trust-based. Phase 2
    /// transmits, refreshing the token at most once on an auth rejection.
    /// Phase 3 polls the server until it confirms persistence, reports
    /// failure, or the poll budget runs out. Checksum contradiction is a hard
    /// failure that keeps `can_delete` false.
    pub async fn upload_with_verification(
        &self,
        artifact: &Path,
        metadata: &UploadMetadata,
        token: &str,
    ) -> UploadOutcome {
        let local_checksum = match tokio::fs::read(artifact).await {
            Ok(bytes) => Some(integrity::upload_checksum(&bytes)),
            Err(e) => {
                warn!("Could not read artifact for checksum, degrading to trust-based: {e}");
                None
            }
        };
        let metadata = UploadMetadata {
            checksum: local_checksum.clone(),
            ..metadata.clone()
        };

        let audio_file_id = match self.transport.transmit(artifact, &metadata, token).await {
            Ok(id) => id,
            Err(UploadError::Unauthorized) => {
                let Some(refresh) = &self.token_refresh else {
                    return UploadOutcome::failure(UploadError::Unauthorized.to_string());
                };
                info!("Upload rejected as unauthorized, refreshing token once");
                let new_token = match refresh.refresh().await {
                    Ok(token) => token,
                    Err(e) => return UploadOutcome::failure(e.to_string()),
                };
                match self.transport.transmit(artifact, &metadata, &new_token).await {
                    Ok(id) => id,
                    Err(e) => return UploadOutcome::failure(e.to_string()),
                }
            }
            Err(e) => return UploadOutcome::failure(e.to_string()),
        };
        debug!("Transmit accepted, audio file id {audio_file_id}");

        for attempt in 0..self.config.poll_attempts {
            match self.transport.probe_status(&audio_file_id).await {
                Ok(StatusProbe::Persisted { checksum }) => {
                    if let (Some(server), Some(local)) = (&checksum, &local_checksum) {
                        if server != local {
                            warn!(
                                "Checksum contradiction for {audio_file_id}: \
                                 server {server}, local {local}"
                            );
                            return UploadOutcome {
                                success: false,
                                audio_file_id: Some(audio_file_id),
                                can_delete: false,
                                verified: false,
                                fallback: false,
                                error: Some(
                                    "File verification failed - checksums do not match"
                                        .to_string(),
                                ),
                            };
                        }
                    }
                    info!("Upload {audio_file_id} verified as persisted");
                    return UploadOutcome {
                        success: true,
                        audio_file_id: Some(audio_file_id),
                        can_delete: true,
                        verified: true,
                        fallback: false,
                        error: None,
                    };
                }
                Ok(StatusProbe::Processing) => {
                    debug!(
                        "Upload {audio_file_id} still processing (probe {}/{})",
                        attempt + 1,
                        self.config.poll_attempts
                    );
                }
                Ok(StatusProbe::Failed { error }) => {
                    return UploadOutcome {
                        success: false,
                        audio_file_id: Some(audio_file_id),
                        can_delete: false,
                        verified: false,
                        fallback: false,
                        error: Some(error),
                    };
                }
                Ok(StatusProbe::Unsupported) => {
                    info!("Server cannot confirm uploads, accepting {audio_file_id} on trust");
                    return UploadOutcome {
                        success: true,
                        audio_file_id: Some(audio_file_id),
                        can_delete: true,
                        verified: false,
                        fallback: true,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!("Status probe for {audio_file_id} failed, will retry: {e}");
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        UploadOutcome {
            success: false,
            audio_file_id: Some(audio_file_id),
            can_delete: false,
            verified: false,
            fallback: false,
            error: Some("Server confirmation timeout - upload may have failed".to_string()),
        }
    }

    /// Verified upload with exponential backoff.
    ///
    /// Non-retryable failures (auth, format, checksum contradiction) return
    /// immediately; everything else backs off `initial * 2^attempt`, capped.
    pub async fn upload_with_retry(
        &self,
        artifact: &Path,
        metadata: &UploadMetadata,
        token: &str,
    ) -> UploadOutcome {
        let mut outcome = self.upload_with_verification(artifact, metadata, token).await;
        let mut attempt = 0u32;
        while !outcome.success && attempt < self.config.max_retries {
            if let Some(error) = &outcome.error {
                if !is_retryable_error(error) {
                    debug!("Upload failure is not retryable: {error}");
                    return outcome;
                }
            }
            let delay = self
                .config
                .initial_retry_delay
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(self.config.max_retry_delay);
            warn!(
                "Upload attempt {} failed, retrying in {delay:?}",
                attempt + 1
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            outcome = self.upload_with_verification(artifact, metadata, token).await;
        }
        outcome
    }
}

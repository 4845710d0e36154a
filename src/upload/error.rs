use thiserror::Error;

/// Upload failure taxonomy.
///
/// The split matters for retry policy: auth, format and checksum failures
/// will fail identically on every attempt, so only transport-level failures
/// are worth backing off and retrying.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid file format")]
    InvalidFormat,

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Upload failed: {0}")]
    Transport(String),
}

impl UploadError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transport(_))
    }
}

/// Retry policy over stringified errors, for outcomes that have already been
/// flattened to a message.
pub fn is_retryable_error(error: &str) -> bool {
    const NON_RETRYABLE: [&str; 5] = [
        "Checksum mismatch",
        "checksums do not match",
        "Invalid file format",
        "Unauthorized",
        "Forbidden",
    ];
    !NON_RETRYABLE.iter().any(|marker| error.contains(marker))
}

use thiserror::Error;

/// Errors raised while loading configuration or validating caller input.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Invalid content type: {content_type}. Only video uploads are supported.")]
    InvalidContentType { content_type: String },

    #[error("Media too large: {size} bytes. Maximum size is 512MB.")]
    MediaTooLarge { size: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_content_type(content_type: &str) -> Self {
        Self::InvalidContentType {
            content_type: content_type.to_string(),
        }
    }
}

/// Failure to produce a request signature. Never retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("System clock is before the Unix epoch")]
    ClockBeforeEpoch,

    #[error("Invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

/// Outcome of a single HTTP exchange that did not produce a usable response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Client error {status}: {body}")]
    ClientError { status: u16, body: String },

    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether a caller-level retry policy may repeat the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::ServerError { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::ClientError { status, .. } | GatewayError::ServerError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// A media upload session aborted before reaching FINALIZE's result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Upload buffer is empty")]
    EmptyBuffer,

    #[error("Request signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("INIT failed: {0}")]
    InitFailed(#[source] GatewayError),

    #[error("APPEND failed for segment {index}: {source}")]
    AppendFailed {
        index: usize,
        #[source]
        source: GatewayError,
    },

    #[error("FINALIZE failed: {0}")]
    FinalizeFailed(#[source] GatewayError),
}

impl UploadError {
    /// The gateway failure behind this error, when there is one.
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            UploadError::InitFailed(e) | UploadError::FinalizeFailed(e) => Some(e),
            UploadError::AppendFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            UploadError::EmptyBuffer => "validation",
            UploadError::Signing(_) => "signing",
            UploadError::InitFailed(_) => "INIT",
            UploadError::AppendFailed { .. } => "APPEND",
            UploadError::FinalizeFailed(_) => "FINALIZE",
        }
    }
}

/// Terminal outcomes of the processing status loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Media {media_id} failed processing: {reason}")]
    RemoteFailed { media_id: String, reason: String },

    #[error("Gave up waiting for media processing after {attempts} status checks")]
    AttemptsExhausted { attempts: u32 },

    #[error("STATUS request failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Request signing failed: {0}")]
    Signing(#[from] SigningError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Publishing post failed: {0}")]
pub struct PublishError(#[from] pub GatewayError);

/// Coarse result of the public upload-and-publish entry point. The source
/// error keeps the phase-level detail.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid upload request: {0}")]
    Validation(#[from] AppError),

    #[error("Could not resolve platform user: {0}")]
    Identity(#[source] GatewayError),

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Media processing failed: {0}")]
    Poll(#[from] PollError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl OrchestratorError {
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Validation(_) => false,
            OrchestratorError::Identity(e) => e.is_retryable(),
            OrchestratorError::Upload(e) => e.gateway_error().is_some_and(|g| g.is_retryable()),
            OrchestratorError::Poll(PollError::Gateway(e)) => e.is_retryable(),
            OrchestratorError::Poll(PollError::AttemptsExhausted { .. }) => true,
            OrchestratorError::Poll(_) => false,
            OrchestratorError::Publish(PublishError(e)) => e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_retry_classification() {
        assert!(GatewayError::Transport("timed out".into()).is_retryable());
        assert!(GatewayError::ServerError {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!GatewayError::ClientError {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!GatewayError::Malformed("missing field".into()).is_retryable());
    }

    #[test]
    fn test_upload_error_keeps_phase_and_index() {
        let err = UploadError::AppendFailed {
            index: 2,
            source: GatewayError::ClientError {
                status: 400,
                body: "bad segment".into(),
            },
        };
        assert_eq!(err.phase(), "APPEND");
        assert_eq!(err.gateway_error().and_then(|g| g.status()), Some(400));
        assert!(err.to_string().contains("segment 2"));
    }

    #[test]
    fn test_orchestrator_error_retryability() {
        let exhausted = OrchestratorError::from(PollError::AttemptsExhausted { attempts: 30 });
        assert!(exhausted.is_retryable());

        let rejected = OrchestratorError::from(PollError::RemoteFailed {
            media_id: "1".into(),
            reason: "InvalidMedia".into(),
        });
        assert!(!rejected.is_retryable());

        let usage = OrchestratorError::from(AppError::validation("buffer", "empty"));
        assert!(!usage.is_retryable());
    }
}

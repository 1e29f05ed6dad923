// Main uploader module - orchestrates chunked video upload and publishing
//
// signer -> gateway -> session machine -> poller -> publisher, all injected
// at construction.

pub mod chunks;
pub mod http_gateway;
pub mod oauth;
pub mod processing;
pub mod publisher;
pub mod session;

pub use http_gateway::{HttpGateway, ReqwestGateway};
pub use oauth::RequestSigner;
pub use processing::ProcessingPoller;
pub use publisher::{IdentityClient, PostId, PostPublisher};
pub use session::{MediaId, UploadOutcome, UploadSessionMachine};

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, TokenPair};
use crate::errors::{AppResult, OrchestratorError};
use crate::security::InputValidator;

/// The single entry point the outer layers call.
pub struct MediaPublisher {
    identity: IdentityClient,
    sessions: UploadSessionMachine,
    poller: ProcessingPoller,
    publisher: PostPublisher,
    default_token: TokenPair,
    default_check_after: Duration,
    default_post_text: String,
}

impl MediaPublisher {
    pub fn new(
        identity: IdentityClient,
        sessions: UploadSessionMachine,
        poller: ProcessingPoller,
        publisher: PostPublisher,
        config: &Config,
    ) -> Self {
        Self {
            identity,
            sessions,
            poller,
            publisher,
            default_token: config.access_token.clone(),
            default_check_after: config.default_check_after(),
            default_post_text: config.default_post_text.clone(),
        }
    }

    /// Wire every component from configuration around one shared gateway.
    pub fn from_config(config: &Config, gateway: Arc<dyn HttpGateway>) -> AppResult<Self> {
        let signer = Arc::new(RequestSigner::new(config.consumer.clone()));
        Self::with_signer(config, gateway, signer)
    }

    pub fn with_signer(
        config: &Config,
        gateway: Arc<dyn HttpGateway>,
        signer: Arc<RequestSigner>,
    ) -> AppResult<Self> {
        Ok(Self::new(
            IdentityClient::new(gateway.clone(), config.endpoints.identity_url.clone()),
            UploadSessionMachine::from_config(config, gateway.clone(), signer.clone())?,
            ProcessingPoller::from_config(config, gateway.clone(), signer),
            PostPublisher::new(gateway, config.endpoints.post_url.clone()),
            config,
        ))
    }

    /// Upload a video and publish a post referencing it.
    pub async fn upload_and_publish(
        &self,
        buffer: Bytes,
        file_name: &str,
        content_type: &str,
        bearer_token: &str,
        text: Option<&str>,
    ) -> Result<PostId, OrchestratorError> {
        let media_id = self
            .upload_video(buffer, file_name, content_type, bearer_token)
            .await?;

        let text = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.default_post_text.as_str());

        Ok(self.publisher.publish(&media_id, text, bearer_token).await?)
    }

    /// Upload a video with the configured access token and wait until it is
    /// ready to attach.
    pub async fn upload_video(
        &self,
        buffer: Bytes,
        file_name: &str,
        content_type: &str,
        bearer_token: &str,
    ) -> Result<MediaId, OrchestratorError> {
        self.upload_video_with_token(
            buffer,
            file_name,
            content_type,
            bearer_token,
            &self.default_token,
        )
        .await
    }

    pub async fn upload_video_with_token(
        &self,
        buffer: Bytes,
        file_name: &str,
        content_type: &str,
        bearer_token: &str,
        token: &TokenPair,
    ) -> Result<MediaId, OrchestratorError> {
        InputValidator::validate_media_buffer(&buffer)?;
        let content_type = InputValidator::validate_content_type(content_type)?;
        InputValidator::validate_file_name(file_name)?;
        let file_name = InputValidator::sanitize_filename(file_name);

        let owner_user_id = self
            .identity
            .current_user_id(bearer_token)
            .await
            .map_err(OrchestratorError::Identity)?;

        let outcome = self
            .sessions
            .run_upload(buffer, &file_name, &content_type, &owner_user_id, token)
            .await?;

        match outcome {
            UploadOutcome::Succeeded(media_id) => Ok(media_id),
            UploadOutcome::Processing {
                media_id,
                check_after,
            } => {
                let default_delay = check_after.unwrap_or(self.default_check_after);
                log::info!(
                    "Media {} is processing, polling every {:?} by default",
                    media_id,
                    default_delay
                );
                self.poller
                    .poll_until_ready(&media_id, default_delay, token)
                    .await?;
                Ok(media_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsumerCredentials;
    use crate::errors::{AppError, GatewayError};
    use crate::uploader::http_gateway::fake::FakeGateway;
    use crate::uploader::http_gateway::{GatewayRequest, GatewayResponse};

    fn config() -> Config {
        Config {
            consumer: ConsumerCredentials::new("ck", "cs"),
            access_token: TokenPair::new("at", "ats"),
            chunk_size_bytes: 4,
            ..Config::default()
        }
    }

    fn route(req: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        if req.url.ends_with("/users/me") {
            return Ok(GatewayResponse::new(200, r#"{"data":{"id":"99"}}"#));
        }
        if req.url.ends_with("/tweets") {
            return Ok(GatewayResponse::new(201, r#"{"data":{"id":"555"}}"#));
        }
        match req.field("command").as_deref() {
            Some("INIT") => Ok(GatewayResponse::new(202, r#"{"media_id_string":"7"}"#)),
            Some("APPEND") => Ok(GatewayResponse::new(204, "")),
            Some("FINALIZE") => Ok(GatewayResponse::new(201, r#"{"media_id_string":"7"}"#)),
            other => panic!("unexpected request {:?} {}", other, req.url),
        }
    }

    #[tokio::test]
    async fn test_upload_and_publish_uses_default_text() {
        let gateway = Arc::new(FakeGateway::new(route));
        let publisher = MediaPublisher::from_config(&config(), gateway.clone()).unwrap();

        let post_id = publisher
            .upload_and_publish(Bytes::from_static(b"abcdefgh"), "clip.mp4", "video/mp4", "bearer", None)
            .await
            .unwrap();
        assert_eq!(post_id.as_str(), "555");

        let calls = gateway.calls();
        assert!(calls[0].url.ends_with("/users/me"));
        assert_eq!(calls[1].field("additional_owners").as_deref(), Some("99"));
        match &calls.last().unwrap().body {
            http_gateway::RequestBody::Json(body) => {
                assert_eq!(body["text"], "Check out this cool content!")
            }
            other => panic!("expected JSON body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_the_network() {
        let gateway = Arc::new(FakeGateway::new(route));
        let publisher = MediaPublisher::from_config(&config(), gateway.clone()).unwrap();

        let empty = publisher
            .upload_and_publish(Bytes::new(), "clip.mp4", "video/mp4", "bearer", Some("hi"))
            .await
            .unwrap_err();
        assert!(matches!(
            empty,
            OrchestratorError::Validation(AppError::Validation { .. })
        ));

        let image = publisher
            .upload_and_publish(Bytes::from_static(b"png"), "a.png", "image/png", "bearer", Some("hi"))
            .await
            .unwrap_err();
        assert!(matches!(
            image,
            OrchestratorError::Validation(AppError::InvalidContentType { .. })
        ));

        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_normalized_content_type_reaches_the_wire() {
        let gateway = Arc::new(FakeGateway::new(route));
        let publisher = MediaPublisher::from_config(&config(), gateway.clone()).unwrap();

        publisher
            .upload_video(Bytes::from_static(b"abcdef"), "clip.mp4", " Video/MP4 ", "bearer")
            .await
            .unwrap();

        let calls = gateway.calls();
        assert_eq!(calls[1].field("media_type").as_deref(), Some("video/mp4"));
        match &calls[2].body {
            http_gateway::RequestBody::Multipart(parts) => assert!(parts.iter().any(|p| matches!(
                p,
                http_gateway::FormPart::File { mime_type, .. } if mime_type == "video/mp4"
            ))),
            other => panic!("expected multipart APPEND, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_identity_failure_aborts_before_init() {
        let gateway = Arc::new(FakeGateway::new(|_req: &GatewayRequest| {
            Err(GatewayError::ClientError {
                status: 401,
                body: "Unauthorized".to_string(),
            })
        }));
        let publisher = MediaPublisher::from_config(&config(), gateway.clone()).unwrap();

        let err = publisher
            .upload_video(Bytes::from_static(b"abc"), "clip.mp4", "video/mp4", "expired")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Identity(GatewayError::ClientError { status: 401, .. })
        ));
        assert_eq!(gateway.calls().len(), 1);
    }
}

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{Config, TokenPair};
use crate::errors::{GatewayError, PollError, SigningError};

use super::http_gateway::{GatewayRequest, HttpGateway};
use super::oauth::RequestSigner;
use super::session::MediaId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessingErrorInfo {
    pub code: Option<i64>,
    pub name: Option<String>,
    pub message: Option<String>,
}

/// `processing_info` as reported by FINALIZE and STATUS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessingStatus {
    pub state: ProcessingState,
    pub check_after_secs: Option<u64>,
    pub progress_percent: Option<u8>,
    pub error: Option<ProcessingErrorInfo>,
}

impl ProcessingStatus {
    /// Server-suggested wait before the next STATUS call.
    pub fn check_after(&self) -> Option<Duration> {
        self.check_after_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn failure_reason(&self) -> String {
        match &self.error {
            Some(ProcessingErrorInfo {
                name: Some(name),
                message: Some(message),
                ..
            }) => format!("{}: {}", name, message),
            Some(ProcessingErrorInfo {
                message: Some(message),
                ..
            }) => message.clone(),
            Some(ProcessingErrorInfo {
                name: Some(name), ..
            }) => name.clone(),
            _ => "no error details reported".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    processing_info: Option<ProcessingStatus>,
}

/// Waits for server-side processing of an uploaded media item.
pub struct ProcessingPoller {
    gateway: Arc<dyn HttpGateway>,
    signer: Arc<RequestSigner>,
    upload_url: String,
    max_attempts: u32,
}

impl ProcessingPoller {
    pub fn new(
        gateway: Arc<dyn HttpGateway>,
        signer: Arc<RequestSigner>,
        upload_url: String,
        max_attempts: u32,
    ) -> Self {
        Self {
            gateway,
            signer,
            upload_url,
            max_attempts,
        }
    }

    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn HttpGateway>,
        signer: Arc<RequestSigner>,
    ) -> Self {
        Self::new(
            gateway,
            signer,
            config.endpoints.upload_url.clone(),
            config.max_status_attempts,
        )
    }

    /// Query STATUS until the media succeeds, fails, or the attempt budget
    /// runs out. Between checks it sleeps for the server's `check_after_secs`,
    /// falling back to `default_delay`. Gateway errors end the loop at once.
    pub async fn poll_until_ready(
        &self,
        media_id: &MediaId,
        default_delay: Duration,
        token: &TokenPair,
    ) -> Result<(), PollError> {
        let url = self.status_url(media_id)?;

        for attempt in 1..=self.max_attempts {
            let authorization = self.signer.sign(url.as_str(), "GET", token)?;
            let request = GatewayRequest::get(url.as_str()).header("Authorization", authorization);

            let response = self.gateway.send(request).await?;
            let status = response
                .json::<StatusResponse>()?
                .processing_info
                .ok_or_else(|| {
                    GatewayError::Malformed("STATUS response has no processing_info".to_string())
                })?;

            match status.state {
                ProcessingState::Succeeded => {
                    log::info!(
                        "Media {} finished processing after {} status checks",
                        media_id,
                        attempt
                    );
                    return Ok(());
                }
                ProcessingState::Failed => {
                    let reason = status.failure_reason();
                    log::error!("Media {} failed processing: {}", media_id, reason);
                    return Err(PollError::RemoteFailed {
                        media_id: media_id.to_string(),
                        reason,
                    });
                }
                ProcessingState::Pending | ProcessingState::InProgress => {
                    if attempt == self.max_attempts {
                        break;
                    }
                    let delay = status.check_after().unwrap_or(default_delay);
                    log::debug!(
                        "Media {} is {:?} ({}%), checking again in {:?} (attempt {}/{})",
                        media_id,
                        status.state,
                        status.progress_percent.unwrap_or(0),
                        delay,
                        attempt,
                        self.max_attempts
                    );
                    sleep(delay).await;
                }
            }
        }

        log::warn!(
            "Giving up on media {} after {} status checks",
            media_id,
            self.max_attempts
        );
        Err(PollError::AttemptsExhausted {
            attempts: self.max_attempts,
        })
    }

    fn status_url(&self, media_id: &MediaId) -> Result<Url, SigningError> {
        let mut url = Url::parse(&self.upload_url).map_err(|e| SigningError::InvalidUrl {
            url: self.upload_url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("command", "STATUS")
            .append_pair("media_id", media_id.as_str());
        Ok(url)
    }
}

//! INIT -> APPEND* -> FINALIZE for a single media item.
//!
//! A session is a value of `MediaUploadSession<P>` where `P` is the current
//! phase. Every phase function takes the session by value and hands back the
//! next phase, so a failed or abandoned session can never be observed half
//! way through a transition.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, TokenPair};
use crate::errors::{AppResult, UploadError};
use crate::security::InputValidator;

use super::chunks::{self, Chunks};
use super::http_gateway::{FormPart, GatewayRequest, HttpGateway, RequestBody};
use super::oauth::RequestSigner;
use super::processing::{ProcessingState, ProcessingStatus};

/// Platform-assigned identifier of an uploaded media item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initialized,
    Appending,
    Finalizing,
    Processing,
    Succeeded,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "Created",
            SessionState::Initialized => "Initialized",
            SessionState::Appending => "Appending",
            SessionState::Finalizing => "Finalizing",
            SessionState::Processing => "Processing",
            SessionState::Succeeded => "Succeeded",
            SessionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

pub trait Phase {
    const STATE: SessionState;
}

pub struct Created;

pub struct Initialized {
    media_id: MediaId,
}

pub struct Appending {
    media_id: MediaId,
    remaining: Chunks,
}

pub struct Finalizing {
    media_id: MediaId,
}

impl Phase for Created {
    const STATE: SessionState = SessionState::Created;
}

impl Phase for Initialized {
    const STATE: SessionState = SessionState::Initialized;
}

impl Phase for Appending {
    const STATE: SessionState = SessionState::Appending;
}

impl Phase for Finalizing {
    const STATE: SessionState = SessionState::Finalizing;
}

pub struct MediaUploadSession<P> {
    buffer: Bytes,
    file_name: String,
    content_type: String,
    chunk_size: NonZeroUsize,
    phase: P,
}

impl<P: Phase> MediaUploadSession<P> {
    pub fn state(&self) -> SessionState {
        P::STATE
    }

    pub fn total_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    fn into_phase<Q>(self, phase: Q) -> MediaUploadSession<Q> {
        MediaUploadSession {
            buffer: self.buffer,
            file_name: self.file_name,
            content_type: self.content_type,
            chunk_size: self.chunk_size,
            phase,
        }
    }
}

impl MediaUploadSession<Created> {
    pub fn new(
        buffer: Bytes,
        file_name: &str,
        content_type: &str,
        chunk_size: NonZeroUsize,
    ) -> Result<Self, UploadError> {
        if buffer.is_empty() {
            return Err(UploadError::EmptyBuffer);
        }
        Ok(Self {
            buffer,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            chunk_size,
            phase: Created,
        })
    }

    pub fn chunk_count(&self) -> usize {
        chunks::chunk_count(self.buffer.len(), self.chunk_size)
    }

    fn initialized(self, media_id: MediaId) -> MediaUploadSession<Initialized> {
        self.into_phase(Initialized { media_id })
    }
}

impl MediaUploadSession<Initialized> {
    pub fn media_id(&self) -> &MediaId {
        &self.phase.media_id
    }

    fn begin_append(self) -> MediaUploadSession<Appending> {
        let remaining = chunks::split(&self.buffer, self.chunk_size);
        let media_id = self.phase.media_id.clone();
        self.into_phase(Appending {
            media_id,
            remaining,
        })
    }
}

impl MediaUploadSession<Appending> {
    pub fn media_id(&self) -> &MediaId {
        &self.phase.media_id
    }

    pub fn remaining_chunks(&self) -> usize {
        self.phase.remaining.len()
    }

    fn finish_append(self) -> MediaUploadSession<Finalizing> {
        let media_id = self.phase.media_id.clone();
        self.into_phase(Finalizing { media_id })
    }
}

impl MediaUploadSession<Finalizing> {
    pub fn media_id(&self) -> &MediaId {
        &self.phase.media_id
    }
}

/// Result of a successful APPEND.
enum AppendStep {
    More(MediaUploadSession<Appending>),
    Done(MediaUploadSession<Finalizing>),
}

/// Where a session stands once FINALIZE has been accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Media is usable right away.
    Succeeded(MediaId),
    /// The platform is still processing; poll STATUS before using the media.
    Processing {
        media_id: MediaId,
        check_after: Option<Duration>,
    },
}

impl UploadOutcome {
    pub fn media_id(&self) -> &MediaId {
        match self {
            UploadOutcome::Succeeded(id) => id,
            UploadOutcome::Processing { media_id, .. } => media_id,
        }
    }

    pub fn state(&self) -> SessionState {
        match self {
            UploadOutcome::Succeeded(_) => SessionState::Succeeded,
            UploadOutcome::Processing { .. } => SessionState::Processing,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct FinalizeResponse {
    media_id_string: Option<String>,
    processing_info: Option<ProcessingStatus>,
}

/// Drives one upload session at a time against the media endpoint. Holds no
/// per-session state, so one machine can serve concurrent uploads.
pub struct UploadSessionMachine {
    gateway: Arc<dyn HttpGateway>,
    signer: Arc<RequestSigner>,
    upload_url: String,
    media_category: String,
    chunk_size: NonZeroUsize,
}

impl UploadSessionMachine {
    pub fn new(
        gateway: Arc<dyn HttpGateway>,
        signer: Arc<RequestSigner>,
        upload_url: String,
        media_category: String,
        chunk_size: NonZeroUsize,
    ) -> Self {
        Self {
            gateway,
            signer,
            upload_url,
            media_category,
            chunk_size,
        }
    }

    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn HttpGateway>,
        signer: Arc<RequestSigner>,
    ) -> AppResult<Self> {
        Ok(Self::new(
            gateway,
            signer,
            config.endpoints.upload_url.clone(),
            config.media_category.clone(),
            config.chunk_size()?,
        ))
    }

    /// Upload `buffer` as one media item owned by `owner_user_id`.
    ///
    /// Issues one INIT, one APPEND per chunk in index order and one FINALIZE.
    /// The first failing call aborts the session; nothing is retried and no
    /// cleanup request is sent.
    pub async fn run_upload(
        &self,
        buffer: Bytes,
        file_name: &str,
        content_type: &str,
        owner_user_id: &str,
        token: &TokenPair,
    ) -> Result<UploadOutcome, UploadError> {
        let session = MediaUploadSession::new(buffer, file_name, content_type, self.chunk_size)?;

        log::info!(
            "Starting upload of {} ({} bytes, {} segments)",
            session.file_name,
            session.total_bytes(),
            session.chunk_count()
        );

        let session = self
            .init(session, owner_user_id, token)
            .await
            .map_err(|e| session_failed(None, e))?;
        let media_id = session.media_id().clone();

        let mut appending = session.begin_append();
        let session = loop {
            match self
                .append_next(appending, token)
                .await
                .map_err(|e| session_failed(Some(&media_id), e))?
            {
                AppendStep::More(next) => appending = next,
                AppendStep::Done(finalizing) => break finalizing,
            }
        };

        let outcome = self
            .finalize(session, token)
            .await
            .map_err(|e| session_failed(Some(&media_id), e))?;

        log::info!("Session {} -> {}", media_id, outcome.state());
        Ok(outcome)
    }

    async fn init(
        &self,
        session: MediaUploadSession<Created>,
        owner_user_id: &str,
        token: &TokenPair,
    ) -> Result<MediaUploadSession<Initialized>, UploadError> {
        let mut parts = vec![
            text_part("command", "INIT"),
            text_part("total_bytes", session.total_bytes().to_string()),
            text_part("media_type", session.content_type()),
            text_part("media_category", &self.media_category),
        ];
        if !owner_user_id.is_empty() {
            parts.push(text_part("additional_owners", owner_user_id));
        }

        let request = self.signed_post(RequestBody::Multipart(parts), token)?;
        let response = self
            .gateway
            .send(request)
            .await
            .map_err(UploadError::InitFailed)?;
        let init: InitResponse = response.json().map_err(UploadError::InitFailed)?;

        let media_id = MediaId::new(init.media_id_string);
        log::info!("Session {} -> {}", media_id, SessionState::Initialized);
        Ok(session.initialized(media_id))
    }

    async fn append_next(
        &self,
        mut session: MediaUploadSession<Appending>,
        token: &TokenPair,
    ) -> Result<AppendStep, UploadError> {
        let Some(chunk) = session.phase.remaining.next() else {
            return Ok(AppendStep::Done(session.finish_append()));
        };

        let extension = InputValidator::segment_extension(&session.file_name);
        let parts = vec![
            text_part("command", "APPEND"),
            text_part("media_id", session.media_id().as_str()),
            text_part("segment_index", chunk.index.to_string()),
            text_part("media_category", &self.media_category),
            FormPart::File {
                name: "media".to_string(),
                file_name: format!("chunk_{}.{}", chunk.index, extension),
                mime_type: session.content_type.clone(),
                data: chunk.bytes.clone(),
            },
        ];

        let index = chunk.index;
        let request = self.signed_post(RequestBody::Multipart(parts), token)?;
        self.gateway
            .send(request)
            .await
            .map_err(|source| UploadError::AppendFailed { index, source })?;

        log::debug!(
            "Session {} appended segment {} ({} bytes, {} left)",
            session.media_id(),
            index,
            chunk.len(),
            session.remaining_chunks()
        );

        if session.remaining_chunks() == 0 {
            log::info!(
                "Session {} -> {}",
                session.media_id(),
                SessionState::Finalizing
            );
            Ok(AppendStep::Done(session.finish_append()))
        } else {
            Ok(AppendStep::More(session))
        }
    }

    async fn finalize(
        &self,
        session: MediaUploadSession<Finalizing>,
        token: &TokenPair,
    ) -> Result<UploadOutcome, UploadError> {
        let fields = vec![
            ("command".to_string(), "FINALIZE".to_string()),
            ("media_id".to_string(), session.media_id().to_string()),
        ];

        let request = self.signed_post(RequestBody::Form(fields), token)?;
        let response = self
            .gateway
            .send(request)
            .await
            .map_err(UploadError::FinalizeFailed)?;
        let finalized: FinalizeResponse = response.json().map_err(UploadError::FinalizeFailed)?;

        if let Some(returned) = finalized.media_id_string.as_deref() {
            if returned != session.media_id().as_str() {
                log::warn!(
                    "FINALIZE returned media id {} for session {}",
                    returned,
                    session.media_id()
                );
            }
        }

        let media_id = session.media_id().clone();
        Ok(match finalized.processing_info {
            Some(info) if info.state != ProcessingState::Succeeded => UploadOutcome::Processing {
                media_id,
                check_after: info.check_after(),
            },
            _ => UploadOutcome::Succeeded(media_id),
        })
    }

    /// Urlencoded form fields are covered by the signature, multipart fields are not.
    fn signed_post(&self, body: RequestBody, token: &TokenPair) -> Result<GatewayRequest, UploadError> {
        let form: &[(String, String)] = match &body {
            RequestBody::Form(fields) => fields,
            _ => &[],
        };
        let authorization = self
            .signer
            .sign_with_form(&self.upload_url, "POST", token, form)?;
        Ok(GatewayRequest::post(&self.upload_url, body).header("Authorization", authorization))
    }
}

fn text_part(name: &str, value: impl Into<String>) -> FormPart {
    FormPart::Text {
        name: name.to_string(),
        value: value.into(),
    }
}

fn session_failed(media_id: Option<&MediaId>, error: UploadError) -> UploadError {
    match media_id {
        Some(id) => log::error!(
            "Session {} -> {} during {}: {}",
            id,
            SessionState::Failed,
            error.phase(),
            error
        ),
        None => log::error!(
            "Session -> {} during {}: {}",
            SessionState::Failed,
            error.phase(),
            error
        ),
    }
    error
}

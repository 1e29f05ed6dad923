//! Chunked video upload to the X media API, followed by publishing a post
//! that references the uploaded media.

pub mod config;
pub mod errors;
pub mod security;
pub mod uploader;

pub use config::{Config, ConsumerCredentials, TokenPair};
pub use errors::{
    AppError, AppResult, GatewayError, OrchestratorError, PollError, PublishError, SigningError,
    UploadError,
};
pub use uploader::{MediaId, MediaPublisher, PostId};

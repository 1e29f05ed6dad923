use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::errors::{GatewayError, PublishError};

use super::http_gateway::{GatewayRequest, HttpGateway, RequestBody};
use super::session::MediaId;

/// Identifier of a published post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{ "data": { "id": ... } }`, shared by the post and identity endpoints.
#[derive(Debug, Deserialize)]
struct DataEnvelope {
    data: IdData,
}

#[derive(Debug, Deserialize)]
struct IdData {
    id: String,
}

/// Publishes a post with one attached media item, authorized by bearer token.
pub struct PostPublisher {
    gateway: Arc<dyn HttpGateway>,
    post_url: String,
}

impl PostPublisher {
    pub fn new(gateway: Arc<dyn HttpGateway>, post_url: String) -> Self {
        Self { gateway, post_url }
    }

    pub async fn publish(
        &self,
        media_id: &MediaId,
        text: &str,
        bearer_token: &str,
    ) -> Result<PostId, PublishError> {
        let payload = json!({
            "text": text,
            "media": { "media_ids": [media_id.as_str()] },
        });
        let request = GatewayRequest::post(&self.post_url, RequestBody::Json(payload))
            .bearer(bearer_token);

        let response = self.gateway.send(request).await?;
        let envelope: DataEnvelope = response.json()?;

        log::info!("Published post {} with media {}", envelope.data.id, media_id);
        Ok(PostId::new(envelope.data.id))
    }
}

/// Resolves the platform user behind a bearer token.
pub struct IdentityClient {
    gateway: Arc<dyn HttpGateway>,
    identity_url: String,
}

impl IdentityClient {
    pub fn new(gateway: Arc<dyn HttpGateway>, identity_url: String) -> Self {
        Self {
            gateway,
            identity_url,
        }
    }

    pub async fn current_user_id(&self, bearer_token: &str) -> Result<String, GatewayError> {
        let request = GatewayRequest::get(&self.identity_url).bearer(bearer_token);
        let envelope: DataEnvelope = self.gateway.send(request).await?.json()?;
        log::debug!("Resolved bearer token to user {}", envelope.data.id);
        Ok(envelope.data.id)
    }
}

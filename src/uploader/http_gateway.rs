use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::errors::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// A single part of a multipart body.
#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        data: Bytes,
    },
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Multipart(Vec<FormPart>),
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// Everything needed to issue one outbound call.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl GatewayRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    /// Value of a text field in a multipart or form body, or a query parameter.
    pub fn field(&self, name: &str) -> Option<String> {
        let from_body = match &self.body {
            RequestBody::Multipart(parts) => parts.iter().find_map(|part| match part {
                FormPart::Text { name: n, value } if n == name => Some(value.clone()),
                _ => None,
            }),
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        };

        from_body.or_else(|| {
            reqwest::Url::parse(&self.url).ok().and_then(|url| {
                url.query_pairs()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
            })
        })
    }

    /// Byte length of the first file part, if the body carries one.
    pub fn file_len(&self) -> Option<usize> {
        match &self.body {
            RequestBody::Multipart(parts) => parts.iter().find_map(|part| match part {
                FormPart::File { data, .. } => Some(data.len()),
                _ => None,
            }),
            _ => None,
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: String,
}

impl GatewayResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_str(&self.body).map_err(|e| {
            GatewayError::Malformed(format!(
                "{} (body: {})",
                e,
                &self.body[..floor_char_boundary(&self.body, 200)]
            ))
        })
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = std::cmp::min(max, s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Executes HTTP requests. Implementations issue exactly one network call per
/// `send` and never retry.
#[async_trait]
pub trait HttpGateway: Send + Sync {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError>;
}

/// Map a non-success status onto the error taxonomy.
pub fn classify_status(status: u16, body: String) -> Result<GatewayResponse, GatewayError> {
    match status {
        200..=299 => Ok(GatewayResponse { status, body }),
        400..=499 => Err(GatewayError::ClientError { status, body }),
        500..=599 => Err(GatewayError::ServerError { status, body }),
        _ => Err(GatewayError::Malformed(format!(
            "Unexpected HTTP status {}",
            status
        ))),
    }
}

/// Production gateway backed by a shared reqwest client.
pub struct ReqwestGateway {
    client: Client,
}

impl ReqwestGateway {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn build_form(parts: Vec<FormPart>) -> Result<multipart::Form, GatewayError> {
        let mut form = multipart::Form::new();

        for part in parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::File {
                    name,
                    file_name,
                    mime_type,
                    data,
                } => {
                    let part = multipart::Part::stream(reqwest::Body::from(data))
                        .file_name(file_name)
                        .mime_str(&mime_type)
                        .map_err(|e| {
                            GatewayError::Malformed(format!("Invalid MIME type {}: {}", mime_type, e))
                        })?;
                    form.part(name, part)
                }
            };
        }

        Ok(form)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else {
        "request"
    };
    GatewayError::Transport(format!("{} error: {}", kind, e))
}

#[async_trait]
impl HttpGateway for ReqwestGateway {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Multipart(parts) => builder.multipart(Self::build_form(parts)?),
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Json(value) => builder.json(&value),
        };

        log::debug!("{} {}", request.method.as_str(), request.url);

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            log::warn!(
                "{} {} returned {}: {}",
                request.method.as_str(),
                request.url,
                status,
                &body[..floor_char_boundary(&body, 300)]
            );
        }

        classify_status(status, body)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    type Handler = dyn Fn(&GatewayRequest) -> Result<GatewayResponse, GatewayError> + Send + Sync;

    /// Records every request and answers with a caller-supplied handler.
    pub struct FakeGateway {
        handler: Box<Handler>,
        pub calls: Mutex<Vec<GatewayRequest>>,
    }

    impl FakeGateway {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&GatewayRequest) -> Result<GatewayResponse, GatewayError> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<GatewayRequest> {
            self.calls.lock().unwrap().clone()
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls()
                .iter()
                .map(|r| r.field("command").unwrap_or_default())
                .collect()
        }
    }

    #[async_trait]
    impl HttpGateway for FakeGateway {
        async fn send(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
            let result = (self.handler)(&request);
            self.calls.lock().unwrap().push(request);
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(204, String::new()).is_ok());
        assert!(matches!(
            classify_status(401, "unauthorized".into()),
            Err(GatewayError::ClientError { status: 401, .. })
        ));
        assert!(matches!(
            classify_status(503, String::new()),
            Err(GatewayError::ServerError { status: 503, .. })
        ));
        assert!(matches!(
            classify_status(304, String::new()),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn test_json_decode_failure_is_malformed() {
        #[derive(serde::Deserialize, Debug)]
        struct Expected {
            #[allow(dead_code)]
            media_id_string: String,
        }

        let response = GatewayResponse::new(200, r#"{"unexpected": true}"#);
        assert!(matches!(
            response.json::<Expected>(),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn test_field_reads_body_then_query() {
        let multipart = GatewayRequest::post(
            "https://upload.example/media",
            RequestBody::Multipart(vec![FormPart::Text {
                name: "command".into(),
                value: "APPEND".into(),
            }]),
        );
        assert_eq!(multipart.field("command").as_deref(), Some("APPEND"));

        let status = GatewayRequest::get("https://upload.example/media?command=STATUS&media_id=42");
        assert_eq!(status.field("command").as_deref(), Some("STATUS"));
        assert_eq!(status.field("media_id").as_deref(), Some("42"));
        assert_eq!(status.field("missing"), None);
    }

    #[test]
    fn test_build_form_rejects_bad_mime() {
        let parts = vec![FormPart::File {
            name: "media".into(),
            file_name: "chunk_0.mp4".into(),
            mime_type: "not a mime".into(),
            data: Bytes::from_static(b"abc"),
        }];
        assert!(ReqwestGateway::build_form(parts).is_err());
    }
}

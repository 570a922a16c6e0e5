//! HTTP collaborator seam.
//!
//! The core only needs "send request, receive status + headers + body
//! bytes". [`HttpClient`] is that seam: production runs use the
//! reqwest-backed [`ReqwestClient`], tests use the scripted mock in
//! [`crate::testing`]. Connection pooling comes from reqwest; the core
//! holds no connection state of its own.

use crate::request::BuiltRequest;
use crate::scenario::Method;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A transport-level failure: no usable response was obtained.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other client-side failure (invalid header, protocol error).
    #[error("http error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout(error.to_string())
        } else if error.is_connect() {
            TransportError::Connection(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

/// A decoded response: status, headers, raw body bytes.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lowercased names.
    pub headers: Vec<(String, String)>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Convenience constructor for a JSON response.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(body).expect("serializing a Value cannot fail"),
        }
    }

    /// Decodes the body as JSON.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends one built request and returns the decoded response.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: &BuiltRequest) -> Result<HttpResponse, TransportError>;
}

/// Production [`HttpClient`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Patch => reqwest::Method::PATCH,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: &BuiltRequest) -> Result<HttpResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url);

        for (name, value) in &request.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Other(format!("invalid header name {name:?}: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| TransportError::Other(format!("invalid header value: {e}")))?;
            builder = builder.header(name, value);
        }

        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(status, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_json_decoding() {
        let response = HttpResponse::json(200, &json!([{"index": "gharchive"}]));
        assert_eq!(response.status, 200);
        let body = response.body_json().unwrap();
        assert_eq!(body[0]["index"], "gharchive");
    }

    #[test]
    fn test_response_invalid_json() {
        let response = HttpResponse {
            status: 200,
            headers: vec![],
            body: b"not json".to_vec(),
        };
        assert!(response.body_json().is_err());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Connection("refused".to_string());
        assert_eq!(err.to_string(), "connection failed: refused");
    }
}

//! Transport seam between the retry loop and the actual HTTP stack.
//!
//! The `Transport` trait abstracts over the wire so retry, backoff, and
//! rate-limit handling can be exercised in tests with a scripted fake.
//! `HttpTransport` is the reqwest-backed implementation used in production.

use super::fetch::Endpoint;
use thiserror::Error;

/// A raw HTTP response before classification and decoding.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed `Retry-After` header in seconds, when the provider sent one.
    pub retry_after: Option<u64>,
    pub body: String,
}

/// Transport-level failures (no response was obtained).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),
}

/// Issues a single HTTP call. Implementations do not retry; that is the
/// fetch client's job.
pub trait Transport: Send + Sync {
    fn get(&self, endpoint: &Endpoint) -> Result<RawResponse, TransportError>;

    fn post(
        &self,
        endpoint: &Endpoint,
        body: &serde_json::Value,
    ) -> Result<RawResponse, TransportError>;
}

/// Production transport backed by a blocking reqwest client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("derivscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    fn convert(resp: reqwest::blocking::Response) -> Result<RawResponse, TransportError> {
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = resp
            .text()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }

    fn convert_err(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn get(&self, endpoint: &Endpoint) -> Result<RawResponse, TransportError> {
        let result = self
            .client
            .get(endpoint.url())
            .query(endpoint.params())
            .timeout(endpoint.request_timeout())
            .send();
        match result {
            Ok(resp) => Self::convert(resp),
            Err(e) => Err(Self::convert_err(e)),
        }
    }

    fn post(
        &self,
        endpoint: &Endpoint,
        body: &serde_json::Value,
    ) -> Result<RawResponse, TransportError> {
        let result = self
            .client
            .post(endpoint.url())
            .query(endpoint.params())
            .timeout(endpoint.request_timeout())
            .json(body)
            .send();
        match result {
            Ok(resp) => Self::convert(resp),
            Err(e) => Err(Self::convert_err(e)),
        }
    }
}

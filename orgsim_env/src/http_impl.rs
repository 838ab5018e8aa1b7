//! Production implementation of InferenceTransport using reqwest.

use crate::types::parse_retry_after;
use crate::{Endpoint, EnvError, InferenceTransport, TransportResponse};
use async_trait::async_trait;
use std::time::Duration;

/// HTTP transport backed by a pooled reqwest client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport whose connections time out after `connect_timeout`.
    ///
    /// Per-request deadlines are enforced by the caller so they can be
    /// cancelled uniformly across transports.
    pub fn new(connect_timeout: Duration) -> Result<Self, EnvError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| EnvError::network(e.to_string()))?;
        Ok(Self { client })
    }
    
    fn apply_headers(
        mut builder: reqwest::RequestBuilder,
        endpoint: &Endpoint,
    ) -> reqwest::RequestBuilder {
        for (name, value) in &endpoint.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
    
    async fn finish(response: reqwest::Response) -> Result<TransportResponse, EnvError> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| EnvError::network(e.to_string()))?;
        
        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
    
    fn map_send_error(endpoint: &Endpoint, err: reqwest::Error) -> EnvError {
        if err.is_connect() {
            EnvError::unreachable(&endpoint.url)
        } else if err.is_timeout() {
            EnvError::Timeout(0)
        } else {
            EnvError::network(err.to_string())
        }
    }
}

#[async_trait]
impl InferenceTransport for HttpTransport {
    async fn post_json(
        &self,
        endpoint: &Endpoint,
        body: serde_json::Value,
    ) -> Result<TransportResponse, EnvError> {
        let builder = Self::apply_headers(self.client.post(&endpoint.url), endpoint).json(&body);
        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_send_error(endpoint, e))?;
        Self::finish(response).await
    }
    
    async fn get(&self, endpoint: &Endpoint) -> Result<TransportResponse, EnvError> {
        let builder = Self::apply_headers(self.client.get(&endpoint.url), endpoint);
        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_send_error(endpoint, e))?;
        Self::finish(response).await
    }
}

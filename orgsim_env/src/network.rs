//! Inference transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{Endpoint, TransportResponse};

/// Abstraction for HTTP I/O between the simulation and inference providers.
///
/// # Implementations
///
/// - **Production**: `HttpTransport` wraps a pooled reqwest client
/// - **Simulation**: `ScriptedTransport` replays canned responses in order
///
/// # Request Flow
///
/// ```text
/// LM client                Transport                 Provider
///   |                          |                          |
///   |-- post_json(ep, body) -->|                          |
///   |                          |-- HTTP POST ------------>|
///   |                          |<-------- status + body --|
///   |<-- TransportResponse ----|                          |
/// ```
#[async_trait]
pub trait InferenceTransport: Send + Sync + 'static {
    /// POSTs a JSON body to the endpoint.
    ///
    /// # Returns
    /// * `Ok(TransportResponse)` - Any HTTP status, including 4xx/5xx
    /// * `Err(EnvError)` - The exchange itself failed (connect, read, decode)
    async fn post_json(
        &self,
        endpoint: &Endpoint,
        body: serde_json::Value,
    ) -> Result<TransportResponse, EnvError>;
    
    /// Issues a GET against the endpoint. Used for reachability probes.
    async fn get(&self, endpoint: &Endpoint) -> Result<TransportResponse, EnvError>;
}

//! Unified LM client: Groq, OpenRouter or local Ollama behind one call.
//!
//! All blocking in the simulation lives here. Calls pass through a
//! counting gate, each attempt has a hard timeout, and 429 responses are
//! retried a bounded number of times before degrading to an idle reply.

mod config;
mod error;

pub use config::{LlmConfig, Provider};
pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};

use orgsim_env::{Endpoint, InferenceTransport, OrgContext};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Timeout for the Ollama reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// One completed chat exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub tokens: u64,
    pub duration_ms: u64,
    /// Retries exhausted; `content` is empty and should be read as idle
    pub rate_limited: bool,
}

impl ChatReply {
    /// Synthetic reply after 429 retries run out.
    pub fn rate_limited() -> Self {
        Self {
            content: String::new(),
            tokens: 0,
            duration_ms: 0,
            rate_limited: true,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiReply {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
struct OllamaReply {
    message: ChatMessage,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Provider-agnostic chat client.
pub struct UnifiedClient<Ctx: OrgContext, T: InferenceTransport> {
    config: LlmConfig,
    ctx: Arc<Ctx>,
    transport: Arc<T>,
    gate: Arc<Semaphore>,
}

impl<Ctx: OrgContext, T: InferenceTransport> UnifiedClient<Ctx, T> {
    pub fn new(config: LlmConfig, ctx: Arc<Ctx>, transport: Arc<T>) -> Self {
        let gate = Arc::new(Semaphore::new(config.gate_width()));
        Self {
            config,
            ctx,
            transport,
            gate,
        }
    }
    
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
    
    /// Model name used for an agent at `level`.
    pub fn model_for(&self, level: u8) -> &str {
        self.config.model_for(level)
    }
    
    /// Free gate slots right now.
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }
    
    fn request(&self, system: &str, user: &str, level: u8) -> Result<(Endpoint, serde_json::Value), LlmError> {
        let cfg = &self.config;
        let messages = serde_json::json!([
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ]);
        let model = cfg.model_for(level);
        
        match cfg.provider {
            Provider::Ollama => Ok((
                Endpoint::new(format!("{}/api/chat", cfg.ollama_url)),
                serde_json::json!({
                    "model": model,
                    "stream": false,
                    "messages": messages,
                    "options": { "temperature": cfg.temperature, "num_predict": cfg.max_tokens },
                    "think": false,
                }),
            )),
            provider => {
                let key = cfg
                    .api_key()
                    .ok_or_else(|| LlmError::not_configured(format!("{} selected without an API key", provider)))?;
                let base = match provider {
                    Provider::Groq => &cfg.groq_url,
                    _ => &cfg.openrouter_url,
                };
                let mut endpoint = Endpoint::new(format!("{}/chat/completions", base)).with_bearer(key);
                if provider == Provider::OpenRouter {
                    endpoint = endpoint.with_header("X-Title", "OrgSim");
                }
                Ok((
                    endpoint,
                    serde_json::json!({
                        "model": model,
                        "messages": messages,
                        "temperature": cfg.temperature,
                        "max_tokens": cfg.max_tokens,
                    }),
                ))
            }
        }
    }
    
    /// Sends one system + user exchange on behalf of an agent.
    ///
    /// Waits for a gate slot first. 429s are retried; once retries run out
    /// the call resolves to [`ChatReply::rate_limited`] instead of an error.
    pub async fn chat(&self, agent: &str, level: u8, system: &str, user: &str) -> Result<ChatReply, LlmError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| LlmError::network_error("inference gate closed"))?;
        let (endpoint, body) = self.request(system, user, level)?;
        let started = self.ctx.now();
        let retry = &self.config.retry;
        
        let mut attempt = 0;
        loop {
            let call = self.transport.post_json(&endpoint, body.clone());
            // dropping the future on timeout abandons the request
            let response = match tokio::time::timeout(self.config.timeout, call).await {
                Err(_) => return Err(LlmError::timeout(self.config.timeout)),
                Ok(result) => result?,
            };
            
            if response.status == 429 {
                if attempt < retry.max_retries {
                    let wait = retry.delay(attempt, response.retry_after);
                    warn!(
                        "{} rate limited, retry in {}ms ({}/{})",
                        agent,
                        wait.as_millis(),
                        attempt + 1,
                        retry.max_retries
                    );
                    self.ctx.sleep(wait).await;
                    attempt += 1;
                    continue;
                }
                warn!("{} rate limited after {} retries", agent, retry.max_retries);
                return Ok(ChatReply::rate_limited());
            }
            
            if !response.is_success() {
                return Err(classify_http_status(response.status, &response.body, response.retry_after));
            }
            
            let (content, tokens) = match self.config.provider {
                Provider::Ollama => {
                    let reply: OllamaReply = response.json()?;
                    (reply.message.content.trim().to_string(), reply.eval_count)
                }
                _ => {
                    let reply: OpenAiReply = response.json()?;
                    let content = reply
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .unwrap_or_default();
                    (content, reply.usage.map(|u| u.total_tokens).unwrap_or(0))
                }
            };
            let duration_ms = (self.ctx.now().saturating_sub(started)).as_millis() as u64;
            debug!("{} got {} tokens from {}", agent, tokens, self.config.provider);
            
            return Ok(ChatReply {
                content,
                tokens,
                duration_ms,
                rate_limited: false,
            });
        }
    }
    
    /// Whether the configured provider looks usable.
    ///
    /// Ollama is probed over HTTP; cloud providers only need a key, since a
    /// real health check would spend tokens.
    pub async fn probe(&self) -> bool {
        match self.config.provider {
            Provider::Ollama => {
                let endpoint = Endpoint::new(format!("{}/api/tags", self.config.ollama_url));
                matches!(
                    tokio::time::timeout(PROBE_TIMEOUT, self.transport.get(&endpoint)).await,
                    Ok(Ok(response)) if response.is_success()
                )
            }
            _ => self.config.api_key().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::network::ScriptedTransport;
    use orgsim_env::{EnvError, TransportResponse};
    
    fn groq_config() -> LlmConfig {
        LlmConfig::from_lookup(|k| (k == "GROQ_API_KEY").then(|| "test-key".to_string()))
    }
    
    fn client(config: LlmConfig) -> (Arc<SimContext>, Arc<ScriptedTransport>, UnifiedClient<SimContext, ScriptedTransport>) {
        let ctx = SimContext::shared(42);
        let transport = Arc::new(ScriptedTransport::new());
        let client = UnifiedClient::new(config, ctx.clone(), transport.clone());
        (ctx, transport, client)
    }
    
    #[tokio::test]
    async fn test_openai_style_reply() {
        let (_, transport, client) = client(groq_config());
        transport.push_completion("- Action: work");
        
        let reply = client.chat("Sam", 3, "persona", "prompt").await.unwrap();
        assert_eq!(reply.content, "- Action: work");
        assert_eq!(reply.tokens, 160);
        assert!(!reply.rate_limited);
        
        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://api.groq.com/openai/v1/chat/completions");
        let body = sent.body.as_ref().unwrap();
        assert_eq!(body["model"], "llama-3.1-8b-instant");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "prompt");
    }
    
    #[tokio::test]
    async fn test_ollama_body_and_reply() {
        let (_, transport, client) = client(LlmConfig::default());
        transport.push(TransportResponse::ok(
            r#"{"message":{"role":"assistant","content":"  - Action: hire \n"},"eval_count":33}"#,
        ));
        
        let reply = client.chat("Ana", 9, "p", "u").await.unwrap();
        assert_eq!(reply.content, "- Action: hire");
        assert_eq!(reply.tokens, 33);
        
        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "http://localhost:11434/api/chat");
        assert_eq!(sent.body.as_ref().unwrap()["stream"], false);
    }
    
    #[tokio::test]
    async fn test_429_retries_with_backoff_then_succeeds() {
        let (ctx, transport, client) = client(groq_config());
        transport.push(TransportResponse::rate_limited(None));
        transport.push(TransportResponse::rate_limited(Some(Duration::from_secs(5))));
        transport.push_completion("- Action: work");
        
        let reply = client.chat("Sam", 3, "p", "u").await.unwrap();
        assert_eq!(reply.content, "- Action: work");
        assert_eq!(transport.request_count(), 3);
        // 2s exponential base, then the server's 5s
        assert_eq!(ctx.now(), Duration::from_secs(7));
        assert_eq!(reply.duration_ms, 7000);
    }
    
    #[tokio::test]
    async fn test_429_exhaustion_degrades_to_idle() {
        let (ctx, transport, client) = client(groq_config());
        transport.set_fallback(TransportResponse::rate_limited(None));
        
        let reply = client.chat("Sam", 3, "p", "u").await.unwrap();
        assert_eq!(reply, ChatReply::rate_limited());
        assert_eq!(transport.request_count(), 4);
        assert_eq!(ctx.now(), Duration::from_millis(2000 + 4000 + 8000));
    }
    
    #[tokio::test]
    async fn test_server_error_and_network_error_surface() {
        let (_, transport, client) = client(groq_config());
        transport.push(TransportResponse::status(503, "overloaded"));
        transport.push_error(EnvError::network("reset"));
        
        let err = client.chat("Sam", 3, "p", "u").await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::ServerError);
        assert_eq!(err.status_code, Some(503));
        
        let err = client.chat("Sam", 3, "p", "u").await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::NetworkError);
        assert_eq!(transport.request_count(), 2);
    }
    
    #[tokio::test]
    async fn test_hard_timeout() {
        let (_, transport, client) = client(groq_config().with_timeout(Duration::from_millis(30)));
        transport.set_hang(true);
        
        let err = client.chat("Sam", 3, "p", "u").await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Timeout);
        assert_eq!(client.available_slots(), 4);
    }
    
    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let config = LlmConfig::default().with_provider(Provider::OpenRouter);
        let (_, transport, client) = client(config);
        
        let err = client.chat("Sam", 3, "p", "u").await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::NotConfigured);
        assert_eq!(transport.request_count(), 0);
        assert!(!client.probe().await);
    }
    
    #[tokio::test]
    async fn test_probe_local() {
        let (_, transport, client) = client(LlmConfig::default());
        transport.push(TransportResponse::ok(r#"{"models":[]}"#));
        assert!(client.probe().await);
        
        transport.set_offline(true);
        assert!(!client.probe().await);
    }
    
    #[tokio::test]
    async fn test_gate_bounds_concurrency() {
        let (_, transport, client) = client(groq_config());
        transport.set_fallback(TransportResponse::ok(crate::network::chat_completion_body("- Action: work")));
        transport.set_hold(5);
        let client = Arc::new(client);
        
        let calls = (0..10).map(|i| {
            let client = client.clone();
            async move { client.chat(&format!("agent-{}", i), 3, "p", "u").await }
        });
        let replies = futures::future::join_all(calls).await;
        
        assert!(replies.iter().all(|r| r.is_ok()));
        assert_eq!(transport.request_count(), 10);
        // groq allows four requests at once
        assert_eq!(transport.peak_in_flight(), 4);
        assert_eq!(client.available_slots(), 4);
    }
}

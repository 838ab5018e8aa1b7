//! Scripted inference transport with fault injection.

use async_trait::async_trait;
use orgsim_env::{Endpoint, EnvError, InferenceTransport, TransportResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: Option<serde_json::Value>,
}

/// Simulated provider: replays queued responses in order.
///
/// When the queue is empty the fallback response (if any) is returned;
/// otherwise the provider is reported unreachable.
pub struct ScriptedTransport {
    /// Responses consumed front to back
    queue: Mutex<VecDeque<Result<TransportResponse, EnvError>>>,
    
    /// Returned once the queue is drained
    fallback: Mutex<Option<TransportResponse>>,
    
    /// Every request received, in order
    requests: Mutex<Vec<RecordedRequest>>,
    
    /// Simulated outage: every call fails as unreachable
    offline: Mutex<bool>,
    
    /// Simulated stall: calls never complete
    hang: Mutex<bool>,
    
    /// Simulated latency: times each call yields before answering
    hold: Mutex<u32>,
    
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts a call as in flight until dropped, even when it is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            offline: Mutex::new(false),
            hang: Mutex::new(false),
            hold: Mutex::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
    
    /// Transport whose every answer is a chat completion with `content`.
    pub fn always(content: &str) -> Self {
        let t = Self::new();
        t.set_fallback(TransportResponse::ok(chat_completion_body(content)));
        t
    }
    
    pub fn push(&self, response: TransportResponse) {
        self.queue.lock().unwrap().push_back(Ok(response));
    }
    
    /// Queues an OpenAI-style chat completion carrying `content`.
    pub fn push_completion(&self, content: &str) {
        self.push(TransportResponse::ok(chat_completion_body(content)));
    }
    
    pub fn push_error(&self, error: EnvError) {
        self.queue.lock().unwrap().push_back(Err(error));
    }
    
    pub fn set_fallback(&self, response: TransportResponse) {
        *self.fallback.lock().unwrap() = Some(response);
    }
    
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }
    
    pub fn set_hang(&self, hang: bool) {
        *self.hang.lock().unwrap() = hang;
    }
    
    /// Makes every call yield `polls` times before it answers, so
    /// concurrent callers overlap.
    pub fn set_hold(&self, polls: u32) {
        *self.hold.lock().unwrap() = polls;
    }
    
    /// Most calls that were in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
    
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
    
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
    
    async fn answer(&self, url: &str, body: Option<serde_json::Value>) -> Result<TransportResponse, EnvError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            body,
        });
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        
        let hold = *self.hold.lock().unwrap();
        for _ in 0..hold {
            tokio::task::yield_now().await;
        }
        let hang = *self.hang.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }
        let offline = *self.offline.lock().unwrap();
        if offline {
            return Err(EnvError::unreachable(url));
        }
        
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| EnvError::unreachable(format!("{} (no scripted response)", url))),
        }
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceTransport for ScriptedTransport {
    async fn post_json(
        &self,
        endpoint: &Endpoint,
        body: serde_json::Value,
    ) -> Result<TransportResponse, EnvError> {
        self.answer(&endpoint.url, Some(body)).await
    }
    
    async fn get(&self, endpoint: &Endpoint) -> Result<TransportResponse, EnvError> {
        self.answer(&endpoint.url, None).await
    }
}

/// OpenAI-compatible completion body with one assistant message.
pub fn chat_completion_body(content: &str) -> String {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160 }
    })
    .to_string()
}

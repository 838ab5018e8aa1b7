//! Production implementation of OrgContext using Tokio.

use crate::{OrgContext, SeededRng};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from the system clock, identifiers from random v4 UUIDs.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
    
    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrgContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
    
    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
    
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
    
    fn mint_id(&self, prefix: &str) -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix, &id[..12])
    }
    
    fn derive_rng(&self, _stream: u64) -> SeededRng {
        SeededRng::from_entropy()
    }
    
    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

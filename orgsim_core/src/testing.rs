//! Deterministic context for unit tests.

use async_trait::async_trait;
use orgsim_env::{OrgContext, SeededRng};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Minimal seeded context: a manual clock plus a ChaCha stream for ids.
pub struct TestContext {
    seed: u64,
    clock: Mutex<Duration>,
    rng: Mutex<SeededRng>,
}

impl TestContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock: Mutex::new(Duration::ZERO),
            rng: Mutex::new(SeededRng::new(seed)),
        }
    }
    
    pub fn advance(&self, by: Duration) {
        *self.clock.lock().unwrap() += by;
    }
}

#[async_trait]
impl OrgContext for TestContext {
    fn now(&self) -> Duration {
        *self.clock.lock().unwrap()
    }
    
    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_704_067_200) + self.now()
    }
    
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
    
    fn mint_id(&self, prefix: &str) -> String {
        let n = self.rng.lock().unwrap().next_u64();
        format!("{}-{:012x}", prefix, n & 0xffff_ffff_ffff)
    }
    
    fn derive_rng(&self, stream: u64) -> SeededRng {
        SeededRng::new(self.seed.wrapping_mul(0x9e3779b97f4a7c15) ^ stream)
    }
    
    fn seed(&self) -> u64 {
        self.seed
    }
}

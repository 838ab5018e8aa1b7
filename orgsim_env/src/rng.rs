//! Seeded pseudo-random source shared by every stochastic component.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic PRNG wrapper.
///
/// Backed by ChaCha8 so that a run is reproducible from its seed on every
/// platform. All helpers draw from the same stream in call order.
#[derive(Debug, Clone)]
pub struct SeededRng {
    inner: ChaCha8Rng,
}

impl SeededRng {
    /// Creates a PRNG from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }
    
    /// Creates an unseeded PRNG (production).
    pub fn from_entropy() -> Self {
        Self {
            inner: ChaCha8Rng::from_entropy(),
        }
    }
    
    /// Uniform float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }
    
    pub fn next_u64(&mut self) -> u64 {
        self.inner.gen::<u64>()
    }
    
    /// Fills a 16-byte buffer, used for minting ids.
    pub fn next_bytes(&mut self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        self.inner.fill(&mut bytes);
        bytes
    }
    
    /// Uniform integer in `[min, max]` (inclusive). Returns `min` if the range is empty.
    pub fn range_inclusive(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        self.inner.gen_range(min..=max)
    }
    
    /// Returns true with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
    
    /// Picks one element uniformly, or `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.inner)
    }
}

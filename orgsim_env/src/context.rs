//! Core environment context trait for the organization engines.

use async_trait::async_trait;
use crate::rng::SeededRng;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the scheduler, executor and
/// router can run in both production (tokio) and simulation (virtual clock).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `OsRng`
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// For reproducible runs, all methods that would normally introduce
/// non-determinism (time, randomness, identifiers) are controlled by the
/// implementation.
#[async_trait]
pub trait OrgContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for message timestamps and rate-limit windows.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;
    
    /// Returns the wall-clock time used for recorded transcripts.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Mints a fresh identifier with the given prefix (e.g. `msg`).
    ///
    /// Production draws from OS entropy; simulation draws from the seeded
    /// stream so two runs with the same seed mint the same ids.
    fn mint_id(&self, prefix: &str) -> String;
    
    /// Derives an independent PRNG stream from the master seed.
    ///
    /// Each subsystem (strategies, router) asks for its own stream so that
    /// adding draws in one subsystem does not perturb the others.
    ///
    /// # Arguments
    /// * `stream` - A value to combine with the global seed
    fn derive_rng(&self, stream: u64) -> SeededRng;
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}

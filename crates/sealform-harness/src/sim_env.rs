//! Simulated environment.
//!
//! Time only moves when a test calls [`SimEnv::advance`]. Randomness comes
//! from a `ChaCha8Rng`, so the same seed yields the same ids and tokens.
//! Clones share both the clock and the RNG stream.

#![allow(clippy::disallowed_types, reason = "Synchronous state, never held across await")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sealform_core::env::Environment;

/// Clock start used by [`SimEnv::new`]: 2024-01-01T00:00:00Z.
pub const DEFAULT_START_SECS: u64 = 1_704_067_200;

struct SimEnvInner {
    now_secs: u64,
    rng: ChaCha8Rng,
}

/// Deterministic environment with a manual clock and seeded RNG.
#[derive(Clone)]
pub struct SimEnv {
    inner: Arc<Mutex<SimEnvInner>>,
}

impl SimEnv {
    /// Seed 0, clock at [`DEFAULT_START_SECS`].
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Given seed, clock at [`DEFAULT_START_SECS`].
    pub fn with_seed(seed: u64) -> Self {
        Self::with_seed_at(seed, DEFAULT_START_SECS)
    }

    /// Seed 0, clock at `secs`.
    pub fn at(secs: u64) -> Self {
        Self::with_seed_at(0, secs)
    }

    /// Given seed and clock start.
    pub fn with_seed_at(seed: u64, secs: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimEnvInner {
                now_secs: secs,
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move the clock forward. Sub-second parts are dropped.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.now_secs = inner.now_secs.saturating_add(by.as_secs());
    }

    /// Move the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        self.inner.lock().expect("Mutex poisoned").now_secs
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.inner.lock().expect("Mutex poisoned").rng.fill_bytes(buffer);
    }
}

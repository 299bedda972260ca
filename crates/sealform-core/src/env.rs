//! Environment abstraction for deterministic testing.
//!
//! Decouples the vault logic from system resources (wall clock, randomness).
//! Tests drive a manual clock and a seeded RNG; production uses the system
//! clock and the OS RNG.

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `wall_clock_secs()` never goes backwards within one process
/// - `random_bytes()` uses cryptographically secure entropy in production,
///   since self tokens and export job tokens are bearer capabilities
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current Unix time in seconds.
    fn wall_clock_secs(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// `len` random bytes, hex encoded (`2 * len` characters).
    fn random_hex(&self, len: usize) -> String {
        let mut bytes = vec![0u8; len];
        self.random_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

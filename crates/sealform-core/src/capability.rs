//! Capability strings.
//!
//! Self tokens and export job tokens are bearer secrets: holding one is the
//! authorization. They are minted from the environment RNG, compared in
//! constant time, and never logged.

use crate::env::Environment;

/// Random bytes behind a participant self token.
pub const SELF_TOKEN_BYTES: usize = 32;

/// Random bytes behind an export job token.
pub const JOB_TOKEN_BYTES: usize = 32;

/// Random bytes behind minted response and job ids.
pub const ID_BYTES: usize = 16;

/// Mint a fresh capability token (hex encoded).
pub fn mint_token<E: Environment>(env: &E, bytes: usize) -> String {
    env.random_hex(bytes)
}

/// Mint a fresh public identifier (hex encoded).
pub fn mint_id<E: Environment>(env: &E) -> String {
    env.random_hex(ID_BYTES)
}

/// Compare a presented token against the stored one.
///
/// Runs in time independent of where the first mismatch is. Length is not
/// secret (all tokens of a kind have the same length).
pub fn tokens_match(presented: &str, stored: &str) -> bool {
    let (a, b) = (presented.as_bytes(), stored.as_bytes());
    if a.len() != b.len() || b.is_empty() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

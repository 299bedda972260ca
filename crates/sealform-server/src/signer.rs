//! Ed25519 manifest signer.
//!
//! Researchers verify a bundle by checking the hex signature against the
//! serialized manifest with the published verifying key.

use std::{fmt, path::Path};

use ed25519_dalek::{Signer, SigningKey};
use sealform_core::{ManifestSigner, SignerError};
use zeroize::Zeroizing;

use crate::error::ServerError;

/// Signs export manifests with a long-lived Ed25519 key.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Build a signer from a 32-byte seed, hex encoded.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, ServerError> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex.trim())
                .map_err(|e| ServerError::Config(format!("signing key is not hex: {e}")))?,
        );
        if bytes.len() != 32 {
            return Err(ServerError::Config(format!(
                "signing key must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&bytes);
        Ok(Self { key: SigningKey::from_bytes(&seed) })
    }

    /// Read a hex seed from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let seed_hex = Zeroizing::new(
            std::fs::read_to_string(path)
                .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?,
        );
        Self::from_seed_hex(&seed_hex)
    }

    /// Hex-encoded verifying key to publish alongside exports.
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }
}

impl ManifestSigner for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Result<String, SignerError> {
        Ok(hex::encode(self.key.sign(message).to_bytes()))
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("verifying_key", &self.verifying_key_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    use super::*;

    const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    #[test]
    fn signature_verifies_under_published_key() {
        let signer = Ed25519Signer::from_seed_hex(SEED).unwrap();
        let message = br#"{"version":1}"#;

        let sig_bytes: [u8; 64] =
            hex::decode(signer.sign(message).unwrap()).unwrap().try_into().unwrap();
        let key_bytes: [u8; 32] =
            hex::decode(signer.verifying_key_hex()).unwrap().try_into().unwrap();

        let verifying_key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        assert!(verifying_key.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok());
        assert!(verifying_key.verify(b"tampered", &Signature::from_bytes(&sig_bytes)).is_err());
    }

    #[test]
    fn rejects_malformed_seeds() {
        assert!(matches!(Ed25519Signer::from_seed_hex("zz"), Err(ServerError::Config(_))));
        assert!(matches!(Ed25519Signer::from_seed_hex("abcd"), Err(ServerError::Config(_))));
    }

    #[test]
    fn reads_seed_file_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.key");
        std::fs::write(&path, format!("{SEED}\n")).unwrap();

        let from_file = Ed25519Signer::from_file(&path).unwrap();
        let direct = Ed25519Signer::from_seed_hex(SEED).unwrap();
        assert_eq!(from_file.verifying_key_hex(), direct.verifying_key_hex());
    }

    #[test]
    fn debug_does_not_print_seed() {
        let signer = Ed25519Signer::from_seed_hex(SEED).unwrap();
        assert!(!format!("{signer:?}").contains(SEED));
    }
}

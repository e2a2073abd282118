//! # Ed25519 Identities
//!
//! A peer or client identity is an Ed25519 keypair. The public key doubles as
//! the identifier on the wire, hex-encoded. Signatures always cover the
//! canonical digest of a value, never raw struct bytes.

use crate::canonical::canonical_digest;
use crate::errors::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;
use zeroize::Zeroize;

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// An asymmetric identity. Created once per process (replica) or client
/// session; immutable after creation.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Restore an identity from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The public key identifying this peer.
    pub fn public_key(&self) -> PublicKey {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Hex form of the public key, the wire identifier.
    pub fn public_key_hex(&self) -> String {
        encode_public_key(&self.public_key())
    }

    /// Sign the canonical digest of a value.
    pub fn sign_canonical<T: Serialize>(&self, value: &T) -> Result<Signature, CryptoError> {
        let digest = canonical_digest(value)?;
        Ok(self.signing_key.sign(&digest).to_bytes())
    }

    /// Secret seed for persistence. Handle with care.
    pub fn to_seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Drop for Identity {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

/// Verify a signature over the canonical digest of a value.
///
/// Fails closed: malformed hex, wrong-length keys, invalid curve points and
/// garbage signatures all return `false`.
pub fn verify_canonical<T: Serialize>(value: &T, sig: &Signature, signer_hex: &str) -> bool {
    let Ok(digest) = canonical_digest(value) else {
        return false;
    };
    let Some(key) = decode_public_key(signer_hex) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(sig);
    verifying_key.verify(&digest, &signature).is_ok()
}

/// Encode a public key as lowercase hex.
pub fn encode_public_key(key: &PublicKey) -> String {
    hex::encode(key)
}

/// Decode a hex public key. `None` on malformed input.
pub fn decode_public_key(hex_str: &str) -> Option<PublicKey> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Payload {
        view: u64,
        digest: String,
    }

    fn payload() -> Payload {
        Payload {
            view: 0,
            digest: "d".into(),
        }
    }

    #[test]
    fn test_sign_verify() {
        let id = Identity::generate();
        let sig = id.sign_canonical(&payload()).unwrap();
        assert!(verify_canonical(&payload(), &sig, &id.public_key_hex()));
    }

    #[test]
    fn test_wrong_signer_fails() {
        let id = Identity::generate();
        let other = Identity::generate();
        let sig = id.sign_canonical(&payload()).unwrap();
        assert!(!verify_canonical(&payload(), &sig, &other.public_key_hex()));
    }

    #[test]
    fn test_tampered_value_fails() {
        let id = Identity::generate();
        let sig = id.sign_canonical(&payload()).unwrap();
        let tampered = Payload {
            view: 1,
            digest: "d".into(),
        };
        assert!(!verify_canonical(&tampered, &sig, &id.public_key_hex()));
    }

    #[test]
    fn test_garbage_signature_fails_closed() {
        let id = Identity::generate();
        let sig = [0xAAu8; 64];
        assert!(!verify_canonical(&payload(), &sig, &id.public_key_hex()));
    }

    #[test]
    fn test_malformed_key_fails_closed() {
        let id = Identity::generate();
        let sig = id.sign_canonical(&payload()).unwrap();
        assert!(!verify_canonical(&payload(), &sig, "not-hex"));
        assert!(!verify_canonical(&payload(), &sig, "abcd"));
    }

    #[test]
    fn test_seed_roundtrip() {
        let id = Identity::generate();
        let restored = Identity::from_seed(id.to_seed());
        assert_eq!(id.public_key(), restored.public_key());
    }

    #[test]
    fn test_deterministic_signatures() {
        let id = Identity::from_seed([7u8; 32]);
        let s1 = id.sign_canonical(&payload()).unwrap();
        let s2 = id.sign_canonical(&payload()).unwrap();
        assert_eq!(s1, s2);
    }
}

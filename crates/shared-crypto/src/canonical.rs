//! # Canonical Hashing
//!
//! SHA-256 over a canonical, sorted-key JSON encoding.
//!
//! ## Why canonical
//!
//! Digests bind consensus payloads to client messages and signatures cover
//! digests, so two replicas serializing the same value must produce the same
//! bytes. `serde_json` object maps are `BTreeMap`s unless the
//! `preserve_order` feature is enabled (it is not, anywhere in this
//! workspace), so encoding through `serde_json::Value` yields sorted keys by
//! construction.

use crate::errors::CryptoError;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Hash a serializable value with SHA-256 over its canonical JSON encoding.
pub fn canonical_digest<T: Serialize>(value: &T) -> Result<Hash, CryptoError> {
    let value = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().into())
}

/// Check a claimed digest against a value. Fails closed on encoding errors.
pub fn verify_digest<T: Serialize>(value: &T, digest: &Hash) -> bool {
    canonical_digest(value).map_or(false, |d| &d == digest)
}

/// Keyed HMAC-SHA-256 digest. Derives the stable node-identity seed from
/// `CRYPTO_SECRET`.
pub fn keyed_digest(secret: &[u8], data: &[u8]) -> Result<Hash, CryptoError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Forward {
        alpha: u64,
        beta: String,
    }

    // Same fields, reversed declaration order.
    #[derive(Serialize)]
    struct Backward {
        beta: String,
        alpha: u64,
    }

    #[test]
    fn test_deterministic() {
        let h1 = canonical_digest(&("a", 1u64)).unwrap();
        let h2 = canonical_digest(&("a", 1u64)).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let forward = Forward {
            alpha: 42,
            beta: "x".into(),
        };
        let backward = Backward {
            beta: "x".into(),
            alpha: 42,
        };
        assert_eq!(
            canonical_digest(&forward).unwrap(),
            canonical_digest(&backward).unwrap()
        );
    }

    #[test]
    fn test_different_values_differ() {
        let h1 = canonical_digest(&1u64).unwrap();
        let h2 = canonical_digest(&2u64).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_verify_digest() {
        let digest = canonical_digest(&"payload").unwrap();
        assert!(verify_digest(&"payload", &digest));
        assert!(!verify_digest(&"tampered", &digest));
    }

    #[test]
    fn test_keyed_digest() {
        let h1 = keyed_digest(b"secret", b"data").unwrap();
        let h2 = keyed_digest(b"secret", b"data").unwrap();
        let h3 = keyed_digest(b"other", b"data").unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}

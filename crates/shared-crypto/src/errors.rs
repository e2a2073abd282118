//! Error types for cryptographic operations.

/// Errors raised on the signing/hashing request path.
///
/// The verification path never returns these; it fails closed with `false`.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("value cannot be canonically encoded: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid HMAC key")]
    InvalidMacKey,
}

//! # shared-crypto
//!
//! Identity and hashing primitives for QuorumLedger.
//!
//! ## Design
//!
//! - **Ed25519 identities**: a replica or client is identified by its public
//!   key, serialized as lowercase hex on the wire.
//! - **Canonical hashing**: every digest and signature in the protocol covers
//!   the sorted-key JSON encoding of a value, so field order in source code
//!   can never change a digest. See [`canonical::canonical_digest`].
//! - **Fail-closed verification**: [`identity::verify_canonical`] returns
//!   `false` for malformed keys and signatures instead of propagating an
//!   error. Attacker-supplied bytes must never panic the verification path.

pub mod canonical;
pub mod errors;
pub mod identity;

pub use canonical::{canonical_digest, keyed_digest, verify_digest, Hash};
pub use errors::CryptoError;
pub use identity::{
    decode_public_key, encode_public_key, verify_canonical, Identity, PublicKey, Signature,
};

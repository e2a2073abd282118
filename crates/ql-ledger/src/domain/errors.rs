//! Error types for the ledger domain.

use shared_crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("block {index} fails its own hash check")]
    InvalidBlockHash { index: u64 },

    #[error("block index out of order: expected {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    #[error("block {index} does not link to its predecessor")]
    BrokenLink { index: u64 },

    #[error("candidate chain is empty")]
    EmptyChain,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

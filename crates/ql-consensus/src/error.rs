//! Consensus engine errors.
//!
//! Validation failures on peer messages are returned to the transport, which
//! logs and drops the message. Nothing here is fatal to the peer; the only
//! fail-fast path is the view-change death timer, signalled through
//! [`crate::Action::Shutdown`], not through an error.

use ql_ledger::LedgerError;
use shared_crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("signature verification failed")]
    WrongSignature,

    #[error("payload digest does not match the carried message")]
    DigestMismatch,

    #[error("view mismatch: expected {expected}, got {actual}")]
    ViewMismatch { expected: u64, actual: u64 },

    #[error("stale sequence number {seq_nb} (low watermark {h})")]
    StaleSequence { seq_nb: u64, h: u64 },

    #[error("unknown replica {replica}")]
    UnknownReplica { replica: String },

    #[error("not the leader of view {view}")]
    NotLeader { view: u64 },

    #[error("no in-flight entry for sequence {seq_nb}")]
    UnknownSequence { seq_nb: u64 },

    #[error("proposed block failed re-verification")]
    BlockMismatch,

    #[error("replica has not synchronized yet")]
    NotSynchronized,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

//! # Chain persistence port
//!
//! Durable append and whole-chain read/replace. The consensus engine never
//! touches this directly; the runtime drains `PersistBlock` actions into it.

use shared_types::Block;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored chain cannot be decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Document-store contract for the chain: read the whole collection, append
/// one block, or replace the collection wholesale.
pub trait ChainStore: Send {
    /// The persisted chain, or `None` if nothing was ever written.
    fn load(&self) -> Result<Option<Vec<Block>>, StoreError>;

    /// Durably append one block.
    fn append(&mut self, block: &Block) -> Result<(), StoreError>;

    /// Replace the whole persisted chain (fork adoption, rollback).
    fn replace(&mut self, chain: &[Block]) -> Result<(), StoreError>;
}

//! In-memory chain store for unit tests.

use crate::ports::{ChainStore, StoreError};
use shared_types::Block;

/// Keeps the chain in a `Vec`. Production uses [`crate::JsonFileStore`].
#[derive(Debug, Default)]
pub struct InMemoryChainStore {
    chain: Option<Vec<Block>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for InMemoryChainStore {
    fn load(&self) -> Result<Option<Vec<Block>>, StoreError> {
        Ok(self.chain.clone())
    }

    fn append(&mut self, block: &Block) -> Result<(), StoreError> {
        self.chain.get_or_insert_with(Vec::new).push(block.clone());
        Ok(())
    }

    fn replace(&mut self, chain: &[Block]) -> Result<(), StoreError> {
        self.chain = Some(chain.to_vec());
        Ok(())
    }
}

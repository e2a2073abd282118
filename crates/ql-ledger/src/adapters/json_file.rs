//! # JSON document file store
//!
//! Persists the chain as a single JSON document at a configurable path,
//! matching the durable-append / whole-collection-read contract. Writes go
//! through a sibling temp file and an atomic rename so a crash mid-write
//! never leaves a torn document.

use crate::ports::{ChainStore, StoreError};
use shared_types::Block;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, chain: &[Block]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(chain)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ChainStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Block>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let chain = serde_json::from_slice(&bytes)?;
        Ok(Some(chain))
    }

    fn append(&mut self, block: &Block) -> Result<(), StoreError> {
        let mut chain = self.load()?.unwrap_or_default();
        chain.push(block.clone());
        self.write_document(&chain)?;
        debug!(path = %self.path.display(), len = chain.len(), "chain appended");
        Ok(())
    }

    fn replace(&mut self, chain: &[Block]) -> Result<(), StoreError> {
        self.write_document(chain)?;
        debug!(path = %self.path.display(), len = chain.len(), "chain replaced");
        Ok(())
    }
}

//! # Chain state management
//!
//! The append-only, hash-linked block sequence and its fork-choice rule.

use super::errors::LedgerError;
use super::state::genesis_accounts;
use shared_crypto::canonical_digest;
use shared_types::Block;
use tracing::debug;

/// Sentinel predecessor hash for the genesis block.
const GENESIS_PREV_HASH: [u8; 32] = [0u8; 32];

/// An ordered, append-only sequence of blocks starting from a fixed,
/// deterministic genesis block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blockchain {
    chain: Vec<Block>,
}

impl Blockchain {
    /// A chain holding only the genesis block.
    ///
    /// Genesis is deterministic: every replica builds the same block from
    /// the fixed initial accounts, so chains from different peers always
    /// share it.
    pub fn genesis() -> Result<Self, LedgerError> {
        let state_hash = canonical_digest(&genesis_accounts())?;
        let genesis = Block::new(0, vec![], GENESIS_PREV_HASH, state_hash)?;
        Ok(Self {
            chain: vec![genesis],
        })
    }

    /// Rebuild from a persisted chain, validating it first.
    pub fn from_chain(chain: Vec<Block>) -> Result<Self, LedgerError> {
        if chain.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        Self::validate(&chain)?;
        Ok(Self { chain })
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// The most recently appended block.
    pub fn last(&self) -> &Block {
        // The chain always holds at least genesis.
        &self.chain[self.chain.len() - 1]
    }

    /// Append a block after checking its hash and linkage.
    pub fn push(&mut self, block: Block) -> Result<(), LedgerError> {
        let expected = self.chain.len() as u64;
        if block.index != expected {
            return Err(LedgerError::OutOfOrder {
                expected,
                actual: block.index,
            });
        }
        if block.prev_hash != self.last().hash {
            return Err(LedgerError::BrokenLink { index: block.index });
        }
        if !block.hash_is_valid() {
            return Err(LedgerError::InvalidBlockHash { index: block.index });
        }
        self.chain.push(block);
        Ok(())
    }

    /// Drop every block past `len`. Rollback target for view-change.
    pub fn truncate(&mut self, len: usize) {
        // Never drop genesis.
        self.chain.truncate(len.max(1));
    }

    /// Whether a chain is internally consistent: every block's stored hash
    /// matches its contents and links to its predecessor.
    pub fn is_valid(chain: &[Block]) -> bool {
        Self::validate(chain).is_ok()
    }

    fn validate(chain: &[Block]) -> Result<(), LedgerError> {
        for (i, block) in chain.iter().enumerate() {
            if block.index != i as u64 {
                return Err(LedgerError::OutOfOrder {
                    expected: i as u64,
                    actual: block.index,
                });
            }
            if !block.hash_is_valid() {
                return Err(LedgerError::InvalidBlockHash { index: block.index });
            }
            if i > 0 && block.prev_hash != chain[i - 1].hash {
                return Err(LedgerError::BrokenLink { index: block.index });
            }
        }
        Ok(())
    }

    /// Fork choice: adopt `candidate` iff it shares our genesis block, is
    /// internally valid, and is strictly longer. Equal-length candidates are
    /// never adopted.
    ///
    /// Returns whether the local chain was replaced.
    pub fn replace(&mut self, candidate: Vec<Block>) -> bool {
        match candidate.first() {
            None => {
                debug!("rejecting candidate chain: empty");
                false
            }
            Some(genesis) if *genesis != self.chain[0] => {
                debug!("rejecting candidate chain: genesis block does not match");
                false
            }
            Some(_) if !Self::is_valid(&candidate) => {
                debug!("rejecting candidate chain: invalid");
                false
            }
            Some(_) if candidate.len() <= self.chain.len() => {
                debug!(
                    candidate_len = candidate.len(),
                    local_len = self.chain.len(),
                    "rejecting candidate chain: not strictly longer"
                );
                false
            }
            Some(_) => {
                self.chain = candidate;
                true
            }
        }
    }
}

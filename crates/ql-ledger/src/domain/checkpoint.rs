//! Periodic agreed snapshots used as view-change rollback targets.

use super::state::LedgerState;
use serde::{Deserialize, Serialize};

/// A checkpoint is taken every this many finalized blocks.
pub const CHECKPOINT_INTERVAL: usize = 3;

/// Snapshot of the replicated state at a given chain length.
///
/// Replaced wholesale each time a new checkpoint is produced; view-change
/// rolls both the state and the chain back to the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: LedgerState,
    pub chain_len: usize,
}

impl Checkpoint {
    pub fn new(state: LedgerState, chain_len: usize) -> Self {
        Self { state, chain_len }
    }

    /// The sequence number this checkpoint covers up to.
    pub fn seq(&self) -> u64 {
        self.state.h
    }
}

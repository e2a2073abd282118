//! # Quorum arithmetic
//!
//! Thresholds are counted over sets of unique signer identities, never raw
//! message counts: a replica relaying the same vote twice must not move a
//! round forward.

use std::collections::HashSet;

/// Votes needed to leave the prepare phase: at least `ceil(2/3 · nb_nodes)`
/// distinct signers, own vote included.
pub fn prepare_quorum(nb_nodes: usize) -> usize {
    (2 * nb_nodes + 2) / 3
}

/// Votes needed to commit: strictly more than `floor(nb_nodes / 3)` distinct
/// signers.
pub fn commit_quorum(nb_nodes: usize) -> usize {
    nb_nodes / 3 + 1
}

/// A set of distinct signer identities (hex public keys) backing one phase of
/// one round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VoteSet {
    signers: HashSet<String>,
}

impl VoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote. Returns `false` if this signer already voted.
    pub fn insert(&mut self, signer: String) -> bool {
        self.signers.insert(signer)
    }

    pub fn contains(&self, signer: &str) -> bool {
        self.signers.contains(signer)
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn clear(&mut self) {
        self.signers.clear();
    }
}

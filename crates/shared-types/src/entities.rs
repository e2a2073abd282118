//! # Core Domain Entities
//!
//! The ledger and consensus entities every subsystem agrees on.

use serde::{Deserialize, Serialize};
use shared_crypto::{canonical_digest, CryptoError, Hash};

/// Account identifier. The genesis account is [`GENESIS_ACCOUNT`].
pub type AccountId = String;

/// The account seeded at genesis.
pub const GENESIS_ACCOUNT: &str = "0";

/// Initial balance of the genesis account, in base units.
pub const GENESIS_BALANCE: u64 = 100;

/// A monetary transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
}

/// A client-signed request submitted to the current leader.
///
/// `client` is the hex public key the accompanying signature is checked
/// against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub tx: Transaction,
    pub timestamp: u64,
    pub client: String,
}

/// An executed-transaction record.
///
/// Invalid transfers (insufficient balance) are recorded with `valid = false`
/// rather than discarded, so every block carries an auditable rejection
/// trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedTx {
    pub request: ClientRequest,
    pub valid: bool,
}

/// The payload bound to a client request during the three consensus phases.
///
/// `digest` is the canonical hash of the [`ClientRequest`], binding the
/// payload to the message without retransmitting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusPayload {
    pub view: u64,
    pub seq_nb: u64,
    pub digest: Hash,
}

/// Commit receipt signed by each replica and returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyResult {
    pub view: u64,
    pub timestamp: u64,
    pub client: String,
    pub replica: usize,
    pub valid: bool,
}

/// A replica's vote to abandon the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChangeVote {
    pub new_view: u64,
    pub last_checkpoint_seq: u64,
}

/// An immutable unit of the ledger.
///
/// `hash` is computed at construction over (index, prev_hash, data,
/// state_hash) and never changes afterwards. `state_hash` commits to the
/// account state resulting from this block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub data: Vec<ExecutedTx>,
    pub prev_hash: Hash,
    pub state_hash: Hash,
    pub hash: Hash,
}

/// The hashed portion of a block. Everything except `hash` itself.
#[derive(Serialize)]
struct BlockBody<'a> {
    index: u64,
    data: &'a [ExecutedTx],
    prev_hash: &'a Hash,
    state_hash: &'a Hash,
}

impl Block {
    /// Build a block, computing its content hash.
    pub fn new(
        index: u64,
        data: Vec<ExecutedTx>,
        prev_hash: Hash,
        state_hash: Hash,
    ) -> Result<Self, CryptoError> {
        let hash = canonical_digest(&BlockBody {
            index,
            data: &data,
            prev_hash: &prev_hash,
            state_hash: &state_hash,
        })?;
        Ok(Self {
            index,
            data,
            prev_hash,
            state_hash,
            hash,
        })
    }

    /// Recompute the content hash from the block's fields.
    pub fn compute_hash(&self) -> Result<Hash, CryptoError> {
        canonical_digest(&BlockBody {
            index: self.index,
            data: &self.data,
            prev_hash: &self.prev_hash,
            state_hash: &self.state_hash,
        })
    }

    /// Whether the stored hash matches the block contents.
    pub fn hash_is_valid(&self) -> bool {
        self.compute_hash().map_or(false, |h| h == self.hash)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: u64) -> ClientRequest {
        ClientRequest {
            tx: Transaction {
                from: GENESIS_ACCOUNT.into(),
                to: "a".into(),
                amount,
            },
            timestamp: 1,
            client: "aa".into(),
        }
    }

    #[test]
    fn test_block_hash_binds_contents() {
        let block = Block::new(1, vec![], [1u8; 32], [2u8; 32]).unwrap();
        assert!(block.hash_is_valid());

        let mut tampered = block.clone();
        tampered.data.push(ExecutedTx {
            request: request(3),
            valid: true,
        });
        assert!(!tampered.hash_is_valid());
    }

    #[test]
    fn test_block_hash_deterministic() {
        let a = Block::new(4, vec![], [9u8; 32], [7u8; 32]).unwrap();
        let b = Block::new(4, vec![], [9u8; 32], [7u8; 32]).unwrap();
        assert_eq!(a.hash, b.hash);
    }
}

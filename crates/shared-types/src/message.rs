//! # Wire Messages
//!
//! Every message exchanged between peers, as a tagged union with one variant
//! per message kind. The `type` discriminator matches the handler that
//! should receive the message on the remote side.

use crate::entities::{
    AccountId, Block, ClientRequest, ConsensusPayload, ReplyResult, ViewChangeVote,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{Hash, Signature};
use std::collections::BTreeMap;

/// Consensus payload for a block round. Blocks are identified by digest, not
/// by sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub view: u64,
    pub digest: Hash,
}

/// Full replica snapshot sent to a joining peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub accounts: BTreeMap<AccountId, u64>,
    pub peers: Vec<String>,
    pub view: u64,
    pub seq_nb: u64,
    pub h: u64,
    pub chain: Vec<Block>,
}

/// The peer-to-peer wire protocol.
///
/// `replica` fields carry the hex public key of the signing replica; `sig`
/// always covers the canonical digest of the variant's payload.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PeerMessage {
    /// A new node announces its public key.
    Join { key: String },

    /// Snapshot offered to a joining node.
    State { snapshot: StateSnapshot },

    /// Client request forwarded to the leader.
    Request {
        msg: ClientRequest,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// Leader assigns a sequence number to a request.
    PrePrepare {
        payload: ConsensusPayload,
        #[serde_as(as = "Bytes")]
        sig: Signature,
        msg: ClientRequest,
    },

    /// A replica vouches it has stored the pre-prepare.
    Prepare {
        payload: ConsensusPayload,
        replica: String,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// A replica commits to executing the request.
    Commit {
        payload: ConsensusPayload,
        replica: String,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// Leader proposes a mined block.
    BlockPrePrepare {
        block: Block,
        payload: BlockPayload,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// A replica vouches for a proposed block.
    BlockPrepare {
        payload: BlockPayload,
        replica: String,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// A replica commits to appending a proposed block.
    BlockCommit {
        payload: BlockPayload,
        replica: String,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// Signed execution receipt for the originating client.
    Reply {
        result: ReplyResult,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// Vote to abandon the current view after a timeout.
    ViewChange {
        vote: ViewChangeVote,
        replica: String,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// Announcement that a view-change quorum was reached.
    NewView {
        view: u64,
        replica: String,
        #[serde_as(as = "Bytes")]
        sig: Signature,
    },

    /// A peer finished (re)synchronizing.
    Synchronized { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Transaction;

    #[test]
    fn test_type_discriminator() {
        let msg = PeerMessage::Join { key: "ab".into() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "join");

        let msg = PeerMessage::PrePrepare {
            payload: ConsensusPayload {
                view: 0,
                seq_nb: 0,
                digest: [0u8; 32],
            },
            sig: [0u8; 64],
            msg: ClientRequest {
                tx: Transaction {
                    from: "0".into(),
                    to: "1".into(),
                    amount: 3,
                },
                timestamp: 0,
                client: "cc".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "pre-prepare");
    }

    #[test]
    fn test_roundtrip() {
        let msg = PeerMessage::NewView {
            view: 3,
            replica: "ff".into(),
            sig: [9u8; 64],
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: PeerMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, back);
    }
}

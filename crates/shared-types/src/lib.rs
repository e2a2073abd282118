//! # shared-types
//!
//! Domain entities and wire messages for QuorumLedger.
//!
//! ## Clusters
//!
//! - **Ledger**: [`Transaction`], [`ExecutedTx`], [`Block`]
//! - **Consensus**: [`ConsensusPayload`], [`BlockPayload`], [`ReplyResult`],
//!   [`ViewChangeVote`]
//! - **Wire**: [`PeerMessage`], one strongly typed variant per message kind
//!
//! Every crate in the workspace speaks these types; nothing re-defines them.

pub mod entities;
pub mod message;

pub use entities::{
    AccountId, Block, ClientRequest, ConsensusPayload, ExecutedTx, ReplyResult, Transaction,
    ViewChangeVote, GENESIS_ACCOUNT, GENESIS_BALANCE,
};
pub use message::{BlockPayload, PeerMessage, StateSnapshot};

// Re-export the crypto aliases so downstream crates take everything from here.
pub use shared_crypto::{Hash, PublicKey, Signature};

//! # ql-ledger
//!
//! The append-only hash-chained ledger and the replicated account state.
//!
//! ## Architecture
//!
//! - `domain` — [`Blockchain`], [`LedgerState`], [`Checkpoint`]: pure data
//!   structures, no I/O. Owned exclusively by one consensus `Peer`; mutated
//!   only from its synchronous handlers.
//! - `ports` — the [`ChainStore`] outbound port: durable append and
//!   whole-chain read/replace.
//! - `adapters` — [`InMemoryChainStore`] for tests, [`JsonFileStore`] for a
//!   single-file JSON document on disk.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::{InMemoryChainStore, JsonFileStore};
pub use domain::{
    genesis_accounts, Blockchain, Checkpoint, LedgerError, LedgerState, CHECKPOINT_INTERVAL,
};
pub use ports::{ChainStore, StoreError};

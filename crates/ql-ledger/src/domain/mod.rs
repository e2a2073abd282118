//! Ledger domain model.

mod chain;
mod checkpoint;
mod errors;
mod state;

pub use chain::Blockchain;
pub use checkpoint::{Checkpoint, CHECKPOINT_INTERVAL};
pub use errors::LedgerError;
pub use state::{genesis_accounts, LedgerState};

//! Outbound ports.

mod store;

pub use store::{ChainStore, StoreError};

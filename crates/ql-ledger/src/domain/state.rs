//! # Replicated Account State
//!
//! The account-balance state machine. Mutated only by the commit phase of
//! the consensus protocol and by demurrage decay after each finalized block.

use serde::{Deserialize, Serialize};
use shared_crypto::{canonical_digest, CryptoError, Hash};
use shared_types::{AccountId, Transaction, GENESIS_ACCOUNT, GENESIS_BALANCE};
use std::collections::BTreeMap;

/// The accounts every replica starts from.
pub fn genesis_accounts() -> BTreeMap<AccountId, u64> {
    let mut accounts = BTreeMap::new();
    accounts.insert(GENESIS_ACCOUNT.to_string(), GENESIS_BALANCE);
    accounts
}

/// The replicated ledger state.
///
/// Invariants: `h <= seq_nb`, `nb_nodes >= 1`, and no balance is ever
/// negative (balances are unsigned and [`LedgerState::apply`] rejects
/// uncovered transfers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Account balances. A `BTreeMap` keeps iteration (and hashing) order
    /// canonical.
    pub accounts: BTreeMap<AccountId, u64>,
    /// Current leader epoch.
    pub view: u64,
    /// Next unassigned sequence number.
    pub seq_nb: u64,
    /// Low watermark: last executed sequence number.
    pub h: u64,
    /// Current replica-set size.
    pub nb_nodes: usize,
}

impl LedgerState {
    pub fn new(nb_nodes: usize) -> Self {
        Self {
            accounts: genesis_accounts(),
            view: 0,
            seq_nb: 0,
            h: 0,
            nb_nodes,
        }
    }

    /// Balance of an account, zero if unknown. Pure read.
    pub fn balance_of(&self, account: &str) -> u64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    /// Apply a transfer iff the sender's balance covers the amount.
    ///
    /// Returns whether the transfer was applied. A rejected transfer leaves
    /// the state untouched.
    pub fn apply(&mut self, tx: &Transaction) -> bool {
        let from_balance = self.balance_of(&tx.from);
        if from_balance < tx.amount {
            return false;
        }
        // Debit before credit so a self-transfer nets to zero.
        self.accounts.insert(tx.from.clone(), from_balance - tx.amount);
        let to_balance = self.balance_of(&tx.to);
        self.accounts.insert(tx.to.clone(), to_balance + tx.amount);
        true
    }

    /// Decay every balance by `1/den`, once per finalized block.
    ///
    /// Integer decay: balances below `den` lose nothing.
    pub fn apply_demurrage(&mut self, den: u64) {
        if den == 0 {
            return;
        }
        for balance in self.accounts.values_mut() {
            *balance -= *balance / den;
        }
    }

    /// Canonical commitment to the account state, carried in each block.
    pub fn digest(&self) -> Result<Hash, CryptoError> {
        canonical_digest(&self.accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(from: &str, to: &str, amount: u64) -> Transaction {
        Transaction {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    #[test]
    fn test_genesis_balance() {
        let state = LedgerState::new(1);
        assert_eq!(state.balance_of(GENESIS_ACCOUNT), GENESIS_BALANCE);
        assert_eq!(state.balance_of("unknown"), 0);
    }

    #[test]
    fn test_apply_covered_transfer() {
        let mut state = LedgerState::new(1);
        assert!(state.apply(&tx(GENESIS_ACCOUNT, "a", 30)));
        assert_eq!(state.balance_of(GENESIS_ACCOUNT), 70);
        assert_eq!(state.balance_of("a"), 30);
    }

    #[test]
    fn test_reject_uncovered_transfer() {
        let mut state = LedgerState::new(1);
        let before = state.clone();
        assert!(!state.apply(&tx(GENESIS_ACCOUNT, "a", 101)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_unknown_sender_rejected() {
        let mut state = LedgerState::new(1);
        assert!(!state.apply(&tx("ghost", "a", 1)));
        assert_eq!(state.balance_of("a"), 0);
    }

    #[test]
    fn test_self_transfer_nets_zero() {
        let mut state = LedgerState::new(1);
        assert!(state.apply(&tx(GENESIS_ACCOUNT, GENESIS_ACCOUNT, 3)));
        assert_eq!(state.balance_of(GENESIS_ACCOUNT), GENESIS_BALANCE);
    }

    #[test]
    fn test_demurrage() {
        let mut state = LedgerState::new(1);
        state.accounts.insert("rich".into(), 10_000);
        state.apply_demurrage(1000);
        assert_eq!(state.balance_of("rich"), 9_990);
        // Genesis balance (100) is below the denominator: no decay.
        assert_eq!(state.balance_of(GENESIS_ACCOUNT), GENESIS_BALANCE);
    }

    #[test]
    fn test_digest_tracks_accounts_only() {
        let mut a = LedgerState::new(1);
        let mut b = LedgerState::new(4);
        b.view = 9;
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        a.apply(&tx(GENESIS_ACCOUNT, "x", 1));
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }
}

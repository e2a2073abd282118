//! Engine tuning knobs. The runtime populates this from the environment.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Watchdog over one consensus round. On expiry the round is aborted and
    /// a view change requested.
    pub timeout: Duration,
    /// Interval between block proposals on the leader.
    pub mine_interval: Duration,
    /// How long a requested view change may stay unresolved before the
    /// replica shuts itself down.
    pub view_change_timeout: Duration,
    /// Settle delay after admitting a new peer, before the leader resumes
    /// mining.
    pub join_settle: Duration,
    /// Demurrage denominator: every balance decays by `1/demurrage_den` per
    /// finalized block. Zero disables decay.
    pub demurrage_den: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            mine_interval: Duration::from_millis(3000),
            view_change_timeout: Duration::from_millis(4000),
            join_settle: Duration::from_millis(500),
            demurrage_den: 1000,
        }
    }
}

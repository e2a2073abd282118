//! # Membership
//!
//! Joining is snapshot-based: existing replicas append the newcomer to their
//! roster, pause mining, and each sends it a full state snapshot. The
//! newcomer adopts the first snapshot content vouched for by more than a
//! third of the peers it bootstrapped against, then announces itself
//! synchronized. Disconnects shrink the roster in place, renumbering the
//! replicas behind the departed one.

use super::{Peer, PendingOp, QueuedWork};
use crate::actions::{Action, TimerId};
use crate::error::PeerError;
use crate::roster::PeerRoster;
use ql_ledger::{Blockchain, Checkpoint, LedgerState};
use shared_crypto::canonical_digest;
use shared_types::{PeerMessage, StateSnapshot};
use tracing::{debug, info};

impl Peer {
    /// Admit a newcomer: extend the roster, pause mining, offer a snapshot.
    /// Parked if a round is in flight so the snapshot is taken at a quiescent
    /// point.
    pub fn new_peer(&mut self, key: String) -> Result<Vec<Action>, PeerError> {
        if !self.synchronized || self.roster.contains(&key) {
            return Ok(Vec::new());
        }
        if self.pending != PendingOp::Idle {
            debug!(%key, "round in flight, parking join");
            self.queue.push_back(QueuedWork::Join { key });
            return Ok(Vec::new());
        }

        self.roster.push(key.clone());
        self.state.nb_nodes = self.roster.len();
        info!(%key, nb_nodes = self.state.nb_nodes, "peer admitted");

        let mut actions = Vec::new();
        if self.mining {
            self.mining = false;
            actions.push(Action::CancelTimer(TimerId::Mine));
        }
        actions.push(Action::Broadcast(PeerMessage::State {
            snapshot: self.snapshot(),
        }));
        actions.push(Action::SetTimer {
            id: TimerId::JoinSettle,
            duration: self.config.join_settle,
        });
        Ok(actions)
    }

    /// The full replica state offered to a joining peer.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            accounts: self.state.accounts.clone(),
            peers: self.roster.keys().to_vec(),
            view: self.state.view,
            seq_nb: self.state.seq_nb,
            h: self.state.h,
            chain: self.blockchain.chain().to_vec(),
        }
    }

    /// Joining side: tally snapshots by content digest and adopt the first
    /// one vouched for by more than a third of the bootstrap peers.
    pub fn sync_state(&mut self, snapshot: StateSnapshot) -> Result<Vec<Action>, PeerError> {
        if self.synchronized {
            return Ok(Vec::new());
        }
        let digest = canonical_digest(&snapshot)?;
        let entry = self
            .snapshot_votes
            .entry(digest)
            .or_insert_with(|| (snapshot, 0));
        entry.1 += 1;
        debug!(count = entry.1, "snapshot received");
        if entry.1 <= self.expected_peers / 3 {
            return Ok(Vec::new());
        }
        let adopted = entry.0.clone();
        self.adopt_snapshot(adopted)
    }

    fn adopt_snapshot(&mut self, snapshot: StateSnapshot) -> Result<Vec<Action>, PeerError> {
        let blockchain = Blockchain::from_chain(snapshot.chain)?;
        let roster = PeerRoster::from_keys(snapshot.peers);
        let me = self.identity.public_key_hex();
        let index = roster
            .index_of(&me)
            .ok_or(PeerError::UnknownReplica { replica: me.clone() })?;

        self.roster = roster;
        self.index = index;
        self.blockchain = blockchain;
        self.state = LedgerState {
            accounts: snapshot.accounts,
            view: snapshot.view,
            seq_nb: snapshot.seq_nb,
            h: snapshot.h,
            nb_nodes: self.roster.len(),
        };
        self.checkpoint = Checkpoint::new(self.state.clone(), self.blockchain.len());
        self.synchronized = true;
        self.snapshot_votes.clear();
        info!(
            index = self.index,
            nb_nodes = self.state.nb_nodes,
            view = self.state.view,
            chain_len = self.blockchain.len(),
            "state synchronized"
        );

        let mut actions = vec![
            Action::Broadcast(PeerMessage::Synchronized { key: me }),
            Action::PersistChain(self.blockchain.chain().to_vec()),
        ];
        if self.is_leader() {
            self.mining = true;
            actions.push(Action::SetTimer {
                id: TimerId::Mine,
                duration: self.config.mine_interval,
            });
        }
        Ok(actions)
    }

    /// Settle delay after an admission: the leader resumes mining.
    pub fn on_join_settle_timer(&mut self) -> Vec<Action> {
        if self.is_leader() && !self.mining {
            self.mining = true;
            return vec![Action::SetTimer {
                id: TimerId::Mine,
                duration: self.config.mine_interval,
            }];
        }
        Vec::new()
    }

    /// A peer announced it finished synchronizing.
    pub fn handle_synchronized(&mut self, key: String) -> Vec<Action> {
        debug!(%key, "peer synchronized");
        if self.is_leader() && !self.mining {
            self.mining = true;
            return vec![Action::SetTimer {
                id: TimerId::Mine,
                duration: self.config.mine_interval,
            }];
        }
        Vec::new()
    }

    /// Drop a departed peer from the roster, renumbering everyone behind it.
    /// Leadership may land on this replica as a result.
    pub fn handle_peer_disconnect(&mut self, key: &str) -> Vec<Action> {
        let Some(removed) = self.roster.remove(key) else {
            return Vec::new();
        };
        if self.index > removed {
            self.index -= 1;
        }
        self.state.nb_nodes = self.roster.len().max(1);
        info!(
            %key,
            removed_index = removed,
            index = self.index,
            nb_nodes = self.state.nb_nodes,
            "peer removed"
        );

        let mut actions = Vec::new();
        if self.is_leader() && !self.mining {
            self.mining = true;
            actions.push(Action::SetTimer {
                id: TimerId::Mine,
                duration: self.config.mine_interval,
            });
        } else if !self.is_leader() && self.mining {
            self.mining = false;
            actions.push(Action::CancelTimer(TimerId::Mine));
        }
        actions
    }
}

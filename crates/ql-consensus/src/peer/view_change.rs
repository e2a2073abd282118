//! # View change
//!
//! When a consensus round stalls past its watchdog, the replica abandons the
//! in-flight work and votes to rotate the leader. A `ceil(2/3)` quorum of
//! view-change votes yields a new-view announcement; once more than a third
//! of the roster has announced, every replica rolls back to its last
//! checkpoint and resumes in the new view. A view change that never resolves
//! kills the replica: a stuck node must not keep serving stale state.

use super::{Peer, PendingOp};
use crate::actions::{Action, TimerId};
use crate::error::PeerError;
use crate::quorum::{commit_quorum, prepare_quorum};
use shared_crypto::{verify_canonical, Signature};
use shared_types::{PeerMessage, ViewChangeVote};
use tracing::{error, info, warn};

impl Peer {
    /// Consensus watchdog expiry: abort whatever is in flight and ask the
    /// roster to rotate the leader.
    pub fn on_consensus_timeout(&mut self) -> Result<Vec<Action>, PeerError> {
        if self.pending == PendingOp::Idle && !self.in_view_change {
            // Stale timer, the round closed under it.
            return Ok(Vec::new());
        }
        warn!(
            view = self.state.view,
            pending = ?self.pending,
            "consensus round stalled, requesting view change"
        );
        self.abort_in_flight();
        self.ask_change_view()
    }

    fn abort_in_flight(&mut self) {
        match self.pending {
            PendingOp::Transaction(seq_nb) => {
                self.tx_log.remove(&seq_nb);
                self.prepare_votes.remove(&seq_nb);
                self.commit_votes.remove(&seq_nb);
            }
            PendingOp::Block(_) => {
                self.block_round = None;
            }
            PendingOp::Idle => {}
        }
        self.pending = PendingOp::Idle;
    }

    fn ask_change_view(&mut self) -> Result<Vec<Action>, PeerError> {
        self.in_view_change = true;
        let vote = ViewChangeVote {
            new_view: self.state.view + 1,
            last_checkpoint_seq: self.checkpoint.seq(),
        };
        let me = self.identity.public_key_hex();
        let sig = self.identity.sign_canonical(&vote)?;
        let mut actions = vec![
            Action::Broadcast(PeerMessage::ViewChange {
                vote,
                replica: me.clone(),
                sig,
            }),
            Action::SetTimer {
                id: TimerId::ViewChangeDeath,
                duration: self.config.view_change_timeout,
            },
        ];
        actions.extend(self.handle_view_change(vote, me, sig)?);
        Ok(actions)
    }

    /// Count a view-change vote. At a `ceil(2/3)` quorum for a target view,
    /// announce the new view (once).
    pub fn handle_view_change(
        &mut self,
        vote: ViewChangeVote,
        replica: String,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        if !self.roster.contains(&replica) {
            return Err(PeerError::UnknownReplica { replica });
        }
        if !verify_canonical(&vote, &sig, &replica) {
            return Err(PeerError::WrongSignature);
        }
        if vote.new_view <= self.state.view {
            return Err(PeerError::ViewMismatch {
                expected: self.state.view + 1,
                actual: vote.new_view,
            });
        }

        let votes = self.view_change_votes.entry(vote.new_view).or_default();
        votes.insert(replica);
        let reached = votes.len() >= prepare_quorum(self.state.nb_nodes);
        if !reached || !self.announced_new_views.insert(vote.new_view) {
            return Ok(Vec::new());
        }
        info!(new_view = vote.new_view, "view-change quorum reached");

        let me = self.identity.public_key_hex();
        let ack_sig = self.identity.sign_canonical(&vote.new_view)?;
        let mut actions = vec![Action::Broadcast(PeerMessage::NewView {
            view: vote.new_view,
            replica: me.clone(),
            sig: ack_sig,
        })];
        actions.extend(self.handle_new_view(vote.new_view, me, ack_sig)?);
        Ok(actions)
    }

    /// Count a new-view announcement. Past a third of the roster, adopt the
    /// view: roll back to the last checkpoint and resume.
    pub fn handle_new_view(
        &mut self,
        view: u64,
        replica: String,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        if !self.roster.contains(&replica) {
            return Err(PeerError::UnknownReplica { replica });
        }
        if !verify_canonical(&view, &sig, &replica) {
            return Err(PeerError::WrongSignature);
        }
        if view <= self.state.view {
            return Err(PeerError::ViewMismatch {
                expected: self.state.view + 1,
                actual: view,
            });
        }

        let acks = self.new_view_acks.entry(view).or_default();
        acks.insert(replica);
        if acks.len() < commit_quorum(self.state.nb_nodes) {
            return Ok(Vec::new());
        }
        self.adopt_view(view)
    }

    fn adopt_view(&mut self, view: u64) -> Result<Vec<Action>, PeerError> {
        info!(
            old_view = self.state.view,
            new_view = view,
            checkpoint_len = self.checkpoint.chain_len,
            "adopting new view, rolling back to checkpoint"
        );
        self.blockchain.truncate(self.checkpoint.chain_len);
        self.state = self.checkpoint.state.clone();
        self.state.view = view;
        self.state.nb_nodes = self.roster.len();

        // Everything in flight predates the rollback point.
        self.pending = PendingOp::Idle;
        self.block_round = None;
        self.tx_log.clear();
        self.prepare_votes.clear();
        self.commit_votes.clear();
        self.queue.clear();
        self.executed.clear();
        self.view_change_votes.clear();
        self.new_view_acks.clear();
        self.announced_new_views.clear();
        self.in_view_change = false;

        let mut actions = vec![
            Action::CancelTimer(TimerId::Consensus),
            Action::CancelTimer(TimerId::ViewChangeDeath),
            Action::PersistChain(self.blockchain.chain().to_vec()),
        ];
        if self.is_leader() {
            self.mining = true;
            actions.push(Action::SetTimer {
                id: TimerId::Mine,
                duration: self.config.mine_interval,
            });
        } else if self.mining {
            self.mining = false;
            actions.push(Action::CancelTimer(TimerId::Mine));
        }
        Ok(actions)
    }

    /// Death watchdog: a view change that never resolved. Fail fast.
    pub fn on_view_change_death_timer(&mut self) -> Vec<Action> {
        if !self.in_view_change {
            return Vec::new();
        }
        error!(
            view = self.state.view,
            "view change never completed, shutting down"
        );
        vec![Action::Shutdown]
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{cluster, signed_request};
    use super::*;
    use shared_crypto::Identity;
    use shared_types::GENESIS_ACCOUNT;

    /// Open a transaction round on every peer without letting any vote
    /// through, leaving all of them stalled.
    fn stall_round(peers: &mut [Peer]) {
        let client = Identity::from_seed([99u8; 32]);
        let (msg, sig) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);
        let actions = peers[0].handle_request(msg, sig).unwrap();
        let pre_prepare = actions
            .iter()
            .find_map(|a| match a {
                Action::Broadcast(m @ PeerMessage::PrePrepare { .. }) => Some(m.clone()),
                _ => None,
            })
            .unwrap();
        for peer in peers.iter_mut().skip(1) {
            peer.handle_message(pre_prepare.clone()).unwrap();
        }
        for peer in peers.iter() {
            assert_ne!(peer.pending(), PendingOp::Idle);
        }
    }

    #[test]
    fn test_timeout_aborts_round_and_votes() {
        let mut peers = cluster(4);
        stall_round(&mut peers);

        let actions = peers[1].handle_timer(TimerId::Consensus).unwrap();
        assert_eq!(peers[1].pending(), PendingOp::Idle);
        assert!(peers[1].in_view_change);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Broadcast(PeerMessage::ViewChange { vote, .. })
                if vote.new_view == 1)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::ViewChangeDeath,
                ..
            }
        )));
    }

    #[test]
    fn test_quorum_rotates_view_and_rolls_back() {
        let mut peers = cluster(4);
        stall_round(&mut peers);

        // Three of four replicas time out; pump every broadcast to everyone.
        let mut wire: std::collections::VecDeque<(usize, PeerMessage)> =
            std::collections::VecDeque::new();
        for i in 0..3 {
            for action in peers[i].handle_timer(TimerId::Consensus).unwrap() {
                if let Action::Broadcast(m) = action {
                    wire.push_back((i, m));
                }
            }
        }
        while let Some((from, msg)) = wire.pop_front() {
            for (i, peer) in peers.iter_mut().enumerate() {
                if i == from {
                    continue;
                }
                if let Ok(actions) = peer.handle_message(msg.clone()) {
                    for action in actions {
                        if let Action::Broadcast(m) = action {
                            wire.push_back((i, m));
                        }
                    }
                }
            }
        }

        for peer in &peers {
            assert_eq!(peer.state().view, 1);
            assert_eq!(peer.pending(), PendingOp::Idle);
            assert!(!peer.in_view_change);
            // Rolled back to the genesis-era checkpoint.
            assert_eq!(peer.blockchain().len(), 1);
            assert_eq!(peer.balance_of(GENESIS_ACCOUNT), 100);
        }
        // View 1 hands leadership to replica 1.
        assert!(peers[1].is_leader());
        assert!(peers[1].mining);
        assert!(!peers[0].mining);
    }

    #[test]
    fn test_lone_timeout_cannot_rotate() {
        let mut peers = cluster(4);
        stall_round(&mut peers);

        let actions = peers[2].handle_timer(TimerId::Consensus).unwrap();
        let vote = actions
            .iter()
            .find_map(|a| match a {
                Action::Broadcast(m @ PeerMessage::ViewChange { .. }) => Some(m.clone()),
                _ => None,
            })
            .unwrap();
        // One vote lands everywhere, short of the 3-vote quorum.
        for (i, peer) in peers.iter_mut().enumerate() {
            if i == 2 {
                continue;
            }
            peer.handle_message(vote.clone()).unwrap();
            assert_eq!(peer.state().view, 0);
        }

        // The initiator's death timer then fires: fail fast.
        let actions = peers[2].handle_timer(TimerId::ViewChangeDeath).unwrap();
        assert_eq!(actions, vec![Action::Shutdown]);
    }

    #[test]
    fn test_death_timer_inert_when_no_view_change_pending() {
        let mut peers = cluster(1);
        assert!(peers[0]
            .handle_timer(TimerId::ViewChangeDeath)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_stale_view_change_vote_rejected() {
        let mut peers = cluster(4);
        let vote = ViewChangeVote {
            new_view: 0,
            last_checkpoint_seq: 0,
        };
        let sig = peers[1].identity.sign_canonical(&vote).unwrap();
        let replica = peers[1].public_key_hex();
        let err = peers[0].handle_view_change(vote, replica, sig).unwrap_err();
        assert!(matches!(err, PeerError::ViewMismatch { .. }));
    }
}

//! # Transaction rounds
//!
//! The three-phase protocol over a single client request: the leader assigns
//! a sequence number (pre-prepare), replicas vouch they stored the proposal
//! (prepare), then commit and execute it against the replicated state.
//! Every replica, leader included, processes its own vote through the same
//! handler it uses for remote votes.

use super::{InFlightTx, Peer, PendingOp, QueuedWork, TxPhase};
use crate::actions::{Action, TimerId};
use crate::error::PeerError;
use crate::quorum::{commit_quorum, prepare_quorum};
use shared_crypto::{canonical_digest, verify_canonical, verify_digest, Signature};
use shared_types::{ClientRequest, ConsensusPayload, ExecutedTx, PeerMessage, ReplyResult};
use tracing::{debug, info};

impl Peer {
    /// Leader-side admission of a signed client request: verify the client
    /// signature, assign the next sequence number and open the round.
    pub fn handle_request(
        &mut self,
        msg: ClientRequest,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        if !self.synchronized {
            return Err(PeerError::NotSynchronized);
        }
        if !verify_canonical(&msg, &sig, &msg.client) {
            return Err(PeerError::WrongSignature);
        }
        if !self.is_leader() {
            return Err(PeerError::NotLeader {
                view: self.state.view,
            });
        }

        let payload = ConsensusPayload {
            view: self.state.view,
            seq_nb: self.state.seq_nb,
            digest: canonical_digest(&msg)?,
        };
        self.state.seq_nb += 1;
        debug!(seq_nb = payload.seq_nb, client = %msg.client, "request admitted");

        let my_sig = self.identity.sign_canonical(&payload)?;
        let mut actions = vec![Action::Broadcast(PeerMessage::PrePrepare {
            payload,
            sig: my_sig,
            msg: msg.clone(),
        })];
        actions.extend(self.handle_pre_prepare(payload, my_sig, msg)?);
        Ok(actions)
    }

    /// Accept a sequence-number assignment from the leader. Parked if another
    /// round is already in flight.
    pub fn handle_pre_prepare(
        &mut self,
        payload: ConsensusPayload,
        sig: Signature,
        msg: ClientRequest,
    ) -> Result<Vec<Action>, PeerError> {
        if !self.synchronized {
            return Err(PeerError::NotSynchronized);
        }
        if self.pending != PendingOp::Idle {
            debug!(seq_nb = payload.seq_nb, "round in flight, parking pre-prepare");
            self.queue.push_back(QueuedWork::PrePrepare { payload, sig, msg });
            return Ok(Vec::new());
        }

        let leader = self.leader_key()?;
        if !verify_canonical(&payload, &sig, &leader) {
            return Err(PeerError::WrongSignature);
        }
        if payload.view != self.state.view {
            return Err(PeerError::ViewMismatch {
                expected: self.state.view,
                actual: payload.view,
            });
        }
        if payload.seq_nb < self.state.h {
            return Err(PeerError::StaleSequence {
                seq_nb: payload.seq_nb,
                h: self.state.h,
            });
        }
        if !verify_digest(&msg, &payload.digest) {
            return Err(PeerError::DigestMismatch);
        }

        self.tx_log.insert(
            payload.seq_nb,
            InFlightTx {
                msg,
                digest: payload.digest,
                phase: TxPhase::PrePrepared,
            },
        );
        self.pending = PendingOp::Transaction(payload.seq_nb);
        // Followers track the leader's sequence counter so they can take
        // over cleanly after a view change.
        if payload.seq_nb >= self.state.seq_nb {
            self.state.seq_nb = payload.seq_nb + 1;
        }

        let me = self.identity.public_key_hex();
        let my_sig = self.identity.sign_canonical(&payload)?;
        let mut actions = vec![
            Action::SetTimer {
                id: TimerId::Consensus,
                duration: self.config.timeout,
            },
            Action::Broadcast(PeerMessage::Prepare {
                payload,
                replica: me.clone(),
                sig: my_sig,
            }),
        ];
        actions.extend(self.handle_prepare(payload, me, my_sig)?);
        Ok(actions)
    }

    /// Count a prepare vote. At `ceil(2/3 · nb_nodes)` distinct signers the
    /// round moves to the commit phase.
    pub fn handle_prepare(
        &mut self,
        payload: ConsensusPayload,
        replica: String,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        self.check_vote(&payload, &replica, &sig)?;

        let entry = self
            .tx_log
            .get(&payload.seq_nb)
            .ok_or(PeerError::UnknownSequence {
                seq_nb: payload.seq_nb,
            })?;
        if entry.digest != payload.digest {
            return Err(PeerError::DigestMismatch);
        }
        let phase = entry.phase;

        let votes = self.prepare_votes.entry(payload.seq_nb).or_default();
        votes.insert(replica);
        let reached = votes.len() >= prepare_quorum(self.state.nb_nodes);

        if phase != TxPhase::PrePrepared || !reached {
            return Ok(Vec::new());
        }
        if let Some(entry) = self.tx_log.get_mut(&payload.seq_nb) {
            entry.phase = TxPhase::Prepared;
        }
        debug!(seq_nb = payload.seq_nb, "prepared");

        let me = self.identity.public_key_hex();
        let my_sig = self.identity.sign_canonical(&payload)?;
        let mut actions = vec![Action::Broadcast(PeerMessage::Commit {
            payload,
            replica: me.clone(),
            sig: my_sig,
        })];
        actions.extend(self.handle_commit(payload, me, my_sig)?);
        Ok(actions)
    }

    /// Count a commit vote. Past `floor(nb_nodes / 3)` distinct signers on a
    /// locally prepared round, the request is executed, the client receipt
    /// signed, and parked work drained.
    pub fn handle_commit(
        &mut self,
        payload: ConsensusPayload,
        replica: String,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        self.check_vote(&payload, &replica, &sig)?;

        let entry = self
            .tx_log
            .get(&payload.seq_nb)
            .ok_or(PeerError::UnknownSequence {
                seq_nb: payload.seq_nb,
            })?;
        if entry.digest != payload.digest {
            return Err(PeerError::DigestMismatch);
        }
        let phase = entry.phase;
        let request = entry.msg.clone();

        let votes = self.commit_votes.entry(payload.seq_nb).or_default();
        votes.insert(replica);
        let reached = votes.len() >= commit_quorum(self.state.nb_nodes);

        if phase != TxPhase::Prepared || !reached {
            return Ok(Vec::new());
        }

        // Execute. Uncovered transfers are recorded as invalid, not dropped:
        // the rejection itself is replicated.
        let seq_nb = payload.seq_nb;
        let valid = self.state.apply(&request.tx);
        self.state.h = seq_nb;
        self.executed.push(ExecutedTx {
            request: request.clone(),
            valid,
        });
        if let Some(entry) = self.tx_log.get_mut(&seq_nb) {
            entry.phase = TxPhase::Committed;
        }
        self.prepare_votes.remove(&seq_nb);
        self.commit_votes.remove(&seq_nb);
        self.pending = PendingOp::Idle;
        info!(seq_nb, valid, "transaction committed");

        let result = ReplyResult {
            view: self.state.view,
            timestamp: request.timestamp,
            client: request.client.clone(),
            replica: self.index,
            valid,
        };
        let reply_sig = self.identity.sign_canonical(&result)?;
        let mut actions = vec![
            Action::CancelTimer(TimerId::Consensus),
            Action::Reply {
                client: request.client,
                result,
                sig: reply_sig,
            },
        ];
        actions.extend(self.drain_queue());
        Ok(actions)
    }

    /// Shared validation for prepare and commit votes.
    fn check_vote(
        &self,
        payload: &ConsensusPayload,
        replica: &str,
        sig: &Signature,
    ) -> Result<(), PeerError> {
        if !self.synchronized {
            return Err(PeerError::NotSynchronized);
        }
        if !self.roster.contains(replica) {
            return Err(PeerError::UnknownReplica {
                replica: replica.to_string(),
            });
        }
        if !verify_canonical(payload, sig, replica) {
            return Err(PeerError::WrongSignature);
        }
        if payload.view != self.state.view {
            return Err(PeerError::ViewMismatch {
                expected: self.state.view,
                actual: payload.view,
            });
        }
        if payload.seq_nb < self.state.h {
            return Err(PeerError::StaleSequence {
                seq_nb: payload.seq_nb,
                h: self.state.h,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{cluster, signed_request};
    use super::*;
    use shared_crypto::Identity;
    use shared_types::GENESIS_ACCOUNT;

    fn deliver(peers: &mut [Peer], from: usize, msg: &PeerMessage) -> Vec<(usize, Action)> {
        let mut out = Vec::new();
        for (i, peer) in peers.iter_mut().enumerate() {
            if i == from {
                continue;
            }
            if let Ok(actions) = peer.handle_message(msg.clone()) {
                out.extend(actions.into_iter().map(|a| (i, a)));
            }
        }
        out
    }

    #[test]
    fn test_single_node_commits_immediately() {
        let mut peers = cluster(1);
        let client = Identity::from_seed([99u8; 32]);
        let (msg, sig) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);

        let actions = peers[0].handle_request(msg, sig).unwrap();
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Reply { result, .. } if result.valid
        )));
        assert_eq!(peers[0].balance_of(GENESIS_ACCOUNT), 70);
        assert_eq!(peers[0].balance_of("alice"), 30);
        assert_eq!(peers[0].pending(), PendingOp::Idle);
    }

    #[test]
    fn test_rejects_unsigned_request() {
        let mut peers = cluster(1);
        let client = Identity::from_seed([99u8; 32]);
        let (msg, _) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);

        let err = peers[0].handle_request(msg, [0u8; 64]).unwrap_err();
        assert!(matches!(err, PeerError::WrongSignature));
        assert_eq!(peers[0].balance_of(GENESIS_ACCOUNT), 100);
    }

    #[test]
    fn test_follower_refuses_client_requests() {
        let mut peers = cluster(4);
        let client = Identity::from_seed([99u8; 32]);
        let (msg, sig) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);

        let err = peers[1].handle_request(msg, sig).unwrap_err();
        assert!(matches!(err, PeerError::NotLeader { view: 0 }));
    }

    #[test]
    fn test_four_node_round_commits_everywhere() {
        let mut peers = cluster(4);
        let client = Identity::from_seed([99u8; 32]);
        let (msg, sig) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);

        // Pump broadcasts in FIFO order until the wire is silent.
        let mut wire: std::collections::VecDeque<(usize, PeerMessage)> = peers[0]
            .handle_request(msg, sig)
            .unwrap()
            .into_iter()
            .filter_map(|a| match a {
                Action::Broadcast(m) => Some((0, m)),
                _ => None,
            })
            .collect();
        while let Some((from, msg)) = wire.pop_front() {
            for (i, action) in deliver(&mut peers, from, &msg) {
                if let Action::Broadcast(m) = action {
                    wire.push_back((i, m));
                }
            }
        }

        for peer in &peers {
            assert_eq!(peer.balance_of("alice"), 30);
            assert_eq!(peer.pending(), PendingOp::Idle);
            assert_eq!(peer.state().h, 0);
            assert_eq!(peer.state().seq_nb, 1);
        }
    }

    #[test]
    fn test_vote_from_stranger_rejected() {
        let mut peers = cluster(1);
        let client = Identity::from_seed([99u8; 32]);
        let (msg, _sig) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);

        let payload = ConsensusPayload {
            view: 0,
            seq_nb: 0,
            digest: canonical_digest(&msg).unwrap(),
        };
        let stranger = Identity::from_seed([42u8; 32]);
        let sig = stranger.sign_canonical(&payload).unwrap();
        let err = peers[0]
            .handle_prepare(payload, stranger.public_key_hex(), sig)
            .unwrap_err();
        assert!(matches!(err, PeerError::UnknownReplica { .. }));
    }

    #[test]
    fn test_duplicate_prepare_votes_do_not_advance() {
        let mut peers = cluster(4);
        let leader_key = peers[0].public_key_hex();
        let client = Identity::from_seed([99u8; 32]);
        let (msg, sig) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);

        let actions = peers[0].handle_request(msg, sig).unwrap();
        // The leader holds its own prepare vote only; replaying it must not
        // reach the 3-vote quorum.
        let prepare = actions.iter().find_map(|a| match a {
            Action::Broadcast(PeerMessage::Prepare { payload, sig, .. }) => Some((*payload, *sig)),
            _ => None,
        });
        let (payload, sig) = prepare.unwrap();
        let replayed = peers[0]
            .handle_prepare(payload, leader_key, sig)
            .unwrap();
        assert!(replayed.is_empty());
        assert_eq!(peers[0].balance_of("alice"), 0);
    }

    #[test]
    fn test_pre_prepare_parked_while_busy() {
        let mut peers = cluster(4);
        let client = Identity::from_seed([99u8; 32]);

        let (msg1, sig1) = signed_request(&client, GENESIS_ACCOUNT, "alice", 10);
        peers[0].handle_request(msg1, sig1).unwrap();
        assert_eq!(peers[0].pending(), PendingOp::Transaction(0));

        let (msg2, sig2) = signed_request(&client, GENESIS_ACCOUNT, "bob", 5);
        let actions = peers[0].handle_request(msg2, sig2).unwrap();
        // Second round is announced but the local pre-prepare is parked.
        assert_eq!(actions.len(), 1);
        assert_eq!(peers[0].pending(), PendingOp::Transaction(0));
        assert_eq!(peers[0].state().seq_nb, 2);
    }

    #[test]
    fn test_wrong_view_pre_prepare_rejected() {
        let mut peers = cluster(4);
        let client = Identity::from_seed([99u8; 32]);
        let (msg, _) = signed_request(&client, GENESIS_ACCOUNT, "alice", 30);

        let payload = ConsensusPayload {
            view: 7,
            seq_nb: 0,
            digest: canonical_digest(&msg).unwrap(),
        };
        let sig = peers[0].identity.sign_canonical(&payload).unwrap();
        let err = peers[1].handle_pre_prepare(payload, sig, msg).unwrap_err();
        // View 7 would make replica 3 the leader, so the signature check
        // against the expected leader fires first.
        assert!(matches!(
            err,
            PeerError::WrongSignature | PeerError::ViewMismatch { .. }
        ));
    }
}

//! # Block rounds
//!
//! The leader periodically packages everything executed since the last block
//! into a candidate and runs it through the same three-phase protocol as a
//! transaction. Followers re-verify the candidate against their own
//! execution record before voting. Finalizing a block applies demurrage and,
//! every [`CHECKPOINT_INTERVAL`] blocks, refreshes the rollback checkpoint.

use super::{BlockRound, Peer, PendingOp, QueuedWork};
use crate::actions::{Action, TimerId};
use crate::error::PeerError;
use crate::quorum::{commit_quorum, prepare_quorum};
use ql_ledger::{Checkpoint, CHECKPOINT_INTERVAL};
use shared_crypto::{verify_canonical, Signature};
use shared_types::{Block, BlockPayload, PeerMessage};
use tracing::{debug, info};

impl Peer {
    /// Mining tick. Re-arms itself while mining is on; proposes a block only
    /// when this replica leads, nothing is in flight and there is something
    /// to package.
    pub fn on_mine_timer(&mut self) -> Result<Vec<Action>, PeerError> {
        if !self.mining {
            return Ok(Vec::new());
        }
        let mut actions = vec![Action::SetTimer {
            id: TimerId::Mine,
            duration: self.config.mine_interval,
        }];
        if !self.is_leader() || self.pending != PendingOp::Idle || self.executed.is_empty() {
            return Ok(actions);
        }

        let state_hash = self.state.digest()?;
        let last = self.blockchain.last();
        let block = Block::new(
            self.blockchain.len() as u64,
            self.executed.clone(),
            last.hash,
            state_hash,
        )?;
        info!(index = block.index, txs = block.data.len(), "proposing block");

        let payload = BlockPayload {
            view: self.state.view,
            digest: block.hash,
        };
        let sig = self.identity.sign_canonical(&payload)?;
        actions.push(Action::Broadcast(PeerMessage::BlockPrePrepare {
            block: block.clone(),
            payload,
            sig,
        }));
        actions.extend(self.handle_block_pre_prepare(block, payload, sig)?);
        Ok(actions)
    }

    /// Accept a block proposal from the leader after full re-verification:
    /// recomputed hash, chain linkage, and the proposal's execution record
    /// against what this replica executed itself.
    pub fn handle_block_pre_prepare(
        &mut self,
        block: Block,
        payload: BlockPayload,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        if !self.synchronized {
            return Err(PeerError::NotSynchronized);
        }
        if self.pending != PendingOp::Idle {
            debug!(index = block.index, "round in flight, parking block proposal");
            self.queue
                .push_back(QueuedWork::BlockPrePrepare { block, payload, sig });
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
        if payload.digest != block.hash || !block.hash_is_valid() {
            return Err(PeerError::BlockMismatch);
        }
        if block.index != self.blockchain.len() as u64
            || block.prev_hash != self.blockchain.last().hash
        {
            return Err(PeerError::BlockMismatch);
        }
        // The proposal must package exactly what this replica executed, and
        // commit to the state this replica arrived at.
        if block.data != self.executed || block.state_hash != self.state.digest()? {
            return Err(PeerError::BlockMismatch);
        }

        self.pending = PendingOp::Block(block.hash);
        self.block_round = Some(BlockRound {
            block,
            prepared: false,
            prepares: Default::default(),
            commits: Default::default(),
        });

        let me = self.identity.public_key_hex();
        let my_sig = self.identity.sign_canonical(&payload)?;
        let mut actions = vec![
            Action::SetTimer {
                id: TimerId::Consensus,
                duration: self.config.timeout,
            },
            Action::Broadcast(PeerMessage::BlockPrepare {
                payload,
                replica: me.clone(),
                sig: my_sig,
            }),
        ];
        actions.extend(self.handle_block_prepare(payload, me, my_sig)?);
        Ok(actions)
    }

    /// Count a block prepare vote; same thresholds as transaction rounds.
    pub fn handle_block_prepare(
        &mut self,
        payload: BlockPayload,
        replica: String,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        self.check_block_vote(&payload, &replica, &sig)?;

        let quorum = prepare_quorum(self.state.nb_nodes);
        let fire = {
            let round = self.open_round_mut(&payload)?;
            round.prepares.insert(replica);
            if !round.prepared && round.prepares.len() >= quorum {
                round.prepared = true;
                true
            } else {
                false
            }
        };
        if !fire {
            return Ok(Vec::new());
        }
        debug!("block prepared");

        let me = self.identity.public_key_hex();
        let my_sig = self.identity.sign_canonical(&payload)?;
        let mut actions = vec![Action::Broadcast(PeerMessage::BlockCommit {
            payload,
            replica: me.clone(),
            sig: my_sig,
        })];
        actions.extend(self.handle_block_commit(payload, me, my_sig)?);
        Ok(actions)
    }

    /// Count a block commit vote. On quorum: append and persist the block,
    /// apply demurrage, refresh the checkpoint on cadence, close the round.
    pub fn handle_block_commit(
        &mut self,
        payload: BlockPayload,
        replica: String,
        sig: Signature,
    ) -> Result<Vec<Action>, PeerError> {
        self.check_block_vote(&payload, &replica, &sig)?;

        let quorum = commit_quorum(self.state.nb_nodes);
        let finalize = {
            let round = self.open_round_mut(&payload)?;
            round.commits.insert(replica);
            round.prepared && round.commits.len() >= quorum
        };
        if !finalize {
            return Ok(Vec::new());
        }

        let round = self.block_round.take().ok_or(PeerError::BlockMismatch)?;
        self.blockchain.push(round.block.clone())?;
        self.state.apply_demurrage(self.config.demurrage_den);
        self.executed.clear();
        self.pending = PendingOp::Idle;
        info!(
            index = round.block.index,
            txs = round.block.data.len(),
            "block finalized"
        );

        let mut actions = vec![
            Action::CancelTimer(TimerId::Consensus),
            Action::PersistBlock(round.block),
        ];
        // Genesis never counts toward the checkpoint cadence.
        if (self.blockchain.len() - 1) % CHECKPOINT_INTERVAL == 0 {
            self.checkpoint = Checkpoint::new(self.state.clone(), self.blockchain.len());
            debug!(
                chain_len = self.checkpoint.chain_len,
                h = self.checkpoint.seq(),
                "checkpoint taken"
            );
        }
        actions.extend(self.drain_queue());
        Ok(actions)
    }

    fn check_block_vote(
        &self,
        payload: &BlockPayload,
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
        Ok(())
    }

    fn open_round_mut(&mut self, payload: &BlockPayload) -> Result<&mut BlockRound, PeerError> {
        match self.block_round.as_mut() {
            Some(round) if round.block.hash == payload.digest => Ok(round),
            _ => Err(PeerError::BlockMismatch),
        }
    }
}

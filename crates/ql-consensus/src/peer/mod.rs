//! # The consensus peer
//!
//! One [`Peer`] per process. All protocol state lives here; handlers are
//! split by concern across the submodules:
//!
//! - [`requests`] — the three-phase transaction rounds
//! - [`blocks`] — mining and the three-phase block rounds
//! - [`view_change`] — timeout recovery and leader rotation
//! - [`membership`] — join, state sync and disconnect handling
//!
//! The peer is single-threaded by construction: the runtime feeds it one
//! input at a time and drains the returned actions before the next input.

mod blocks;
mod membership;
mod requests;
mod view_change;

use crate::actions::{Action, TimerId};
use crate::config::PeerConfig;
use crate::error::PeerError;
use crate::quorum::VoteSet;
use crate::roster::PeerRoster;
use ql_ledger::{Blockchain, Checkpoint, LedgerState};
use shared_crypto::{Hash, Identity, Signature};
use shared_types::{
    Block, BlockPayload, ClientRequest, ConsensusPayload, ExecutedTx, PeerMessage, StateSnapshot,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// The single in-flight consensus round, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    Idle,
    /// A transaction round, keyed by sequence number.
    Transaction(u64),
    /// A block round, keyed by block digest.
    Block(Hash),
}

/// Where a transaction round currently stands on this replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxPhase {
    PrePrepared,
    Prepared,
    Committed,
}

/// Per-sequence record of an accepted pre-prepare.
#[derive(Debug, Clone)]
pub(crate) struct InFlightTx {
    pub msg: ClientRequest,
    pub digest: Hash,
    pub phase: TxPhase,
}

/// The open block round, if any.
#[derive(Debug, Clone)]
pub(crate) struct BlockRound {
    pub block: Block,
    pub prepared: bool,
    pub prepares: VoteSet,
    pub commits: VoteSet,
}

/// Work parked while another round is in flight.
#[derive(Debug, Clone)]
pub(crate) enum QueuedWork {
    PrePrepare {
        payload: ConsensusPayload,
        sig: Signature,
        msg: ClientRequest,
    },
    BlockPrePrepare {
        block: Block,
        payload: BlockPayload,
        sig: Signature,
    },
    Join {
        key: String,
    },
}

pub struct Peer {
    pub(crate) identity: Identity,
    pub(crate) config: PeerConfig,

    pub(crate) state: LedgerState,
    pub(crate) blockchain: Blockchain,
    pub(crate) checkpoint: Checkpoint,

    pub(crate) roster: PeerRoster,
    pub(crate) index: usize,
    pub(crate) synchronized: bool,
    pub(crate) mining: bool,
    pub(crate) in_view_change: bool,
    /// Cluster size at bootstrap time, used to judge snapshot plurality
    /// while joining.
    pub(crate) expected_peers: usize,

    pub(crate) pending: PendingOp,
    pub(crate) queue: VecDeque<QueuedWork>,

    /// Accepted pre-prepares by sequence number.
    pub(crate) tx_log: BTreeMap<u64, InFlightTx>,
    /// Transactions executed since the last finalized block, in commit order.
    pub(crate) executed: Vec<ExecutedTx>,
    pub(crate) prepare_votes: HashMap<u64, VoteSet>,
    pub(crate) commit_votes: HashMap<u64, VoteSet>,
    pub(crate) block_round: Option<BlockRound>,

    pub(crate) view_change_votes: HashMap<u64, VoteSet>,
    pub(crate) new_view_acks: HashMap<u64, VoteSet>,
    pub(crate) announced_new_views: HashSet<u64>,

    /// Snapshot tallies while joining, keyed by snapshot digest.
    pub(crate) snapshot_votes: HashMap<Hash, (StateSnapshot, usize)>,
}

impl Peer {
    /// Start as the first replica of a fresh network: genesis chain, roster
    /// of one, already synchronized.
    pub fn bootstrap(identity: Identity, config: PeerConfig) -> Result<Self, PeerError> {
        let key = identity.public_key_hex();
        let state = LedgerState::new(1);
        let blockchain = Blockchain::genesis()?;
        let checkpoint = Checkpoint::new(state.clone(), blockchain.len());
        Ok(Self {
            identity,
            config,
            state,
            blockchain,
            checkpoint,
            roster: PeerRoster::from_keys(vec![key]),
            index: 0,
            synchronized: true,
            mining: false,
            in_view_change: false,
            expected_peers: 0,
            pending: PendingOp::Idle,
            queue: VecDeque::new(),
            tx_log: BTreeMap::new(),
            executed: Vec::new(),
            prepare_votes: HashMap::new(),
            commit_votes: HashMap::new(),
            block_round: None,
            view_change_votes: HashMap::new(),
            new_view_acks: HashMap::new(),
            announced_new_views: HashSet::new(),
            snapshot_votes: HashMap::new(),
        })
    }

    /// Start as a joining replica. Unsynchronized until a plurality of the
    /// `expected_peers` bootstrap peers agree on a snapshot.
    pub fn joining(
        identity: Identity,
        config: PeerConfig,
        expected_peers: usize,
    ) -> Result<Self, PeerError> {
        let mut peer = Self::bootstrap(identity, config)?;
        peer.roster = PeerRoster::new();
        peer.synchronized = false;
        peer.expected_peers = expected_peers;
        Ok(peer)
    }

    /// Rebuild from a persisted chain: validate it, replay every recorded
    /// execution against a fresh state, and re-anchor the checkpoint. A
    /// record whose outcome does not reproduce means the chain and the
    /// engine disagree, and the chain is refused.
    pub fn restore(&mut self, chain: Vec<Block>) -> Result<(), PeerError> {
        let blockchain = Blockchain::from_chain(chain)?;
        let mut state = LedgerState::new(self.state.nb_nodes);
        for block in blockchain.chain().iter().skip(1) {
            for record in &block.data {
                if state.apply(&record.request.tx) != record.valid {
                    return Err(PeerError::BlockMismatch);
                }
            }
            if state.digest()? != block.state_hash {
                return Err(PeerError::BlockMismatch);
            }
            state.apply_demurrage(self.config.demurrage_den);
        }
        self.state = state;
        self.blockchain = blockchain;
        self.checkpoint = Checkpoint::new(self.state.clone(), self.blockchain.len());
        Ok(())
    }

    /// The join announcement a fresh replica broadcasts on connect.
    pub fn join_message(&self) -> PeerMessage {
        PeerMessage::Join {
            key: self.identity.public_key_hex(),
        }
    }

    /// Arm the mining tick. Called by the runtime on the bootstrap leader.
    pub fn start_mining(&mut self) -> Vec<Action> {
        if self.mining {
            return Vec::new();
        }
        self.mining = true;
        vec![Action::SetTimer {
            id: TimerId::Mine,
            duration: self.config.mine_interval,
        }]
    }

    /// Dispatch one inbound peer message to its handler.
    pub fn handle_message(&mut self, message: PeerMessage) -> Result<Vec<Action>, PeerError> {
        match message {
            PeerMessage::Join { key } => self.new_peer(key),
            PeerMessage::State { snapshot } => self.sync_state(snapshot),
            PeerMessage::Request { msg, sig } => self.handle_request(msg, sig),
            PeerMessage::PrePrepare { payload, sig, msg } => {
                self.handle_pre_prepare(payload, sig, msg)
            }
            PeerMessage::Prepare {
                payload,
                replica,
                sig,
            } => self.handle_prepare(payload, replica, sig),
            PeerMessage::Commit {
                payload,
                replica,
                sig,
            } => self.handle_commit(payload, replica, sig),
            PeerMessage::BlockPrePrepare {
                block,
                payload,
                sig,
            } => self.handle_block_pre_prepare(block, payload, sig),
            PeerMessage::BlockPrepare {
                payload,
                replica,
                sig,
            } => self.handle_block_prepare(payload, replica, sig),
            PeerMessage::BlockCommit {
                payload,
                replica,
                sig,
            } => self.handle_block_commit(payload, replica, sig),
            // Replies are addressed to clients; a replica receiving one has
            // nothing to do with it.
            PeerMessage::Reply { .. } => Ok(Vec::new()),
            PeerMessage::ViewChange {
                vote,
                replica,
                sig,
            } => self.handle_view_change(vote, replica, sig),
            PeerMessage::NewView { view, replica, sig } => {
                self.handle_new_view(view, replica, sig)
            }
            PeerMessage::Synchronized { key } => Ok(self.handle_synchronized(key)),
        }
    }

    /// Dispatch one expired timer to its handler.
    pub fn handle_timer(&mut self, id: TimerId) -> Result<Vec<Action>, PeerError> {
        match id {
            TimerId::Mine => self.on_mine_timer(),
            TimerId::Consensus => self.on_consensus_timeout(),
            TimerId::ViewChangeDeath => Ok(self.on_view_change_death_timer()),
            TimerId::JoinSettle => Ok(self.on_join_settle_timer()),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.index == self.leader_index()
    }

    pub fn leader_index(&self) -> usize {
        self.roster.leader_index(self.state.view)
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn balance_of(&self, account: &str) -> u64 {
        self.state.balance_of(account)
    }

    pub fn public_key_hex(&self) -> String {
        self.identity.public_key_hex()
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn roster(&self) -> &PeerRoster {
        &self.roster
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pending(&self) -> PendingOp {
        self.pending
    }

    pub(crate) fn leader_key(&self) -> Result<String, PeerError> {
        let index = self.leader_index();
        self.roster
            .get(index)
            .map(str::to_string)
            .ok_or(PeerError::UnknownReplica {
                replica: format!("leader#{index}"),
            })
    }

    /// Process parked work now that no round is in flight. Work that opens a
    /// new round stops the drain; invalid parked work is logged and dropped.
    pub(crate) fn drain_queue(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut budget = self.queue.len();
        while budget > 0 && self.pending == PendingOp::Idle {
            budget -= 1;
            let Some(work) = self.queue.pop_front() else {
                break;
            };
            let outcome = match work {
                QueuedWork::PrePrepare { payload, sig, msg } => {
                    debug!(seq_nb = payload.seq_nb, "draining parked pre-prepare");
                    self.handle_pre_prepare(payload, sig, msg)
                }
                QueuedWork::BlockPrePrepare {
                    block,
                    payload,
                    sig,
                } => {
                    debug!(index = block.index, "draining parked block proposal");
                    self.handle_block_pre_prepare(block, payload, sig)
                }
                QueuedWork::Join { key } => {
                    debug!(%key, "draining parked join");
                    self.new_peer(key)
                }
            };
            match outcome {
                Ok(mut more) => actions.append(&mut more),
                Err(err) => warn!(%err, "dropping parked work"),
            }
        }
        actions
    }
}


#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A pre-wired cluster of `n` synchronized peers sharing one roster,
    /// bypassing the join protocol.
    pub(crate) fn cluster(n: usize) -> Vec<Peer> {
        let identities: Vec<Identity> = (0..n)
            .map(|i| Identity::from_seed([i as u8 + 1; 32]))
            .collect();
        let keys: Vec<String> = identities.iter().map(|id| id.public_key_hex()).collect();
        identities
            .into_iter()
            .enumerate()
            .map(|(index, identity)| {
                let mut peer = Peer::bootstrap(identity, PeerConfig::default())
                    .expect("bootstrap");
                peer.roster = PeerRoster::from_keys(keys.clone());
                peer.index = index;
                peer.state.nb_nodes = n;
                peer.checkpoint = Checkpoint::new(peer.state.clone(), peer.blockchain.len());
                peer
            })
            .collect()
    }

    /// A signed client request.
    pub(crate) fn signed_request(
        client: &Identity,
        from: &str,
        to: &str,
        amount: u64,
    ) -> (ClientRequest, Signature) {
        let msg = ClientRequest {
            tx: shared_types::Transaction {
                from: from.into(),
                to: to.into(),
                amount,
            },
            timestamp: 1,
            client: client.public_key_hex(),
        };
        let sig = client.sign_canonical(&msg).expect("sign");
        (msg, sig)
    }
}

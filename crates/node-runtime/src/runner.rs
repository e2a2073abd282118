//! # The runner task
//!
//! Owns the consensus [`Peer`] and the chain store. Every external event —
//! a WebSocket frame, an HTTP transaction submission, an expired timer, a
//! dropped connection — arrives as one [`Inbound`] on a single mpsc inbox.
//! The runner executes the matching engine handler to completion, performs
//! the returned [`Action`]s (socket writes, timer arming, persistence), then
//! publishes a fresh read snapshot for the HTTP side and takes the next
//! input. The engine is therefore never touched concurrently.

use anyhow::Result;
use parking_lot::RwLock;
use ql_consensus::{Action, Peer, TimerId};
use ql_ledger::ChainStore;
use shared_crypto::Signature;
use shared_types::{AccountId, Block, ClientRequest, PeerMessage};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Identifier for one live WebSocket connection (inbound or dialed).
pub type ConnId = u64;

/// One unit of work for the runner.
#[derive(Debug)]
pub enum Inbound {
    /// A socket came up; `tx` is its outbound frame queue.
    Connected {
        conn: ConnId,
        tx: mpsc::UnboundedSender<PeerMessage>,
    },
    /// A decoded frame arrived on a socket.
    Frame { conn: ConnId, msg: PeerMessage },
    /// A transaction submitted over HTTP. Fire-and-forget; the signed
    /// receipt goes out over the client's WebSocket, if any.
    Submit { msg: ClientRequest, sig: Signature },
    /// An engine timer expired.
    Timer(TimerId),
    /// A socket went down.
    Disconnected { conn: ConnId },
    /// Startup nudge, sent once the bootstrap dials are up: a master starts
    /// mining, a joiner announces itself.
    Bootstrap,
}

/// Read-only snapshot published after every processed input.
#[derive(Debug, Default, Clone)]
pub struct ReadView {
    pub chain: Vec<Block>,
    pub accounts: BTreeMap<AccountId, u64>,
}

/// Cheap, cloneable handle for feeding the runner and reading its snapshot.
#[derive(Clone)]
pub struct RunnerHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    view: Arc<RwLock<ReadView>>,
    next_conn: Arc<AtomicU64>,
}

impl RunnerHandle {
    /// Register a new socket and get its connection id.
    pub fn register(&self, tx: mpsc::UnboundedSender<PeerMessage>) -> ConnId {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Inbound::Connected { conn, tx });
        conn
    }

    pub fn frame(&self, conn: ConnId, msg: PeerMessage) {
        let _ = self.tx.send(Inbound::Frame { conn, msg });
    }

    pub fn submit(&self, msg: ClientRequest, sig: Signature) {
        let _ = self.tx.send(Inbound::Submit { msg, sig });
    }

    pub fn disconnect(&self, conn: ConnId) {
        let _ = self.tx.send(Inbound::Disconnected { conn });
    }

    pub fn bootstrap(&self) {
        let _ = self.tx.send(Inbound::Bootstrap);
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.view.read().chain.clone()
    }

    pub fn balance(&self, account: &str) -> u64 {
        self.view.read().accounts.get(account).copied().unwrap_or(0)
    }
}

struct Conn {
    tx: mpsc::UnboundedSender<PeerMessage>,
    /// Learned from the first identifying frame (join, synchronized, or a
    /// client request); used for disconnect handling and reply routing.
    key: Option<String>,
}

pub struct Runner {
    peer: Peer,
    store: Box<dyn ChainStore>,
    master: bool,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    tx: mpsc::UnboundedSender<Inbound>,
    view: Arc<RwLock<ReadView>>,
    conns: HashMap<ConnId, Conn>,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl Runner {
    pub fn new(peer: Peer, store: Box<dyn ChainStore>, master: bool) -> (Self, RunnerHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let view = Arc::new(RwLock::new(ReadView::default()));
        let handle = RunnerHandle {
            tx: tx.clone(),
            view: Arc::clone(&view),
            next_conn: Arc::new(AtomicU64::new(0)),
        };
        let mut runner = Self {
            peer,
            store,
            master,
            inbox,
            tx,
            view,
            conns: HashMap::new(),
            timers: HashMap::new(),
        };
        runner.publish_view();
        (runner, handle)
    }

    /// Consume the inbox until the channel closes or the engine asks to
    /// shut down.
    pub async fn run(mut self) -> Result<()> {
        while let Some(inbound) = self.inbox.recv().await {
            if !self.dispatch(inbound)? {
                info!("runner stopping on engine shutdown");
                break;
            }
        }
        Ok(())
    }

    /// Process one input. Returns `false` when the engine requested
    /// shutdown.
    fn dispatch(&mut self, inbound: Inbound) -> Result<bool> {
        let actions = match inbound {
            Inbound::Connected { conn, tx } => {
                debug!(conn, "socket up");
                // Announce ourselves on every new socket, dialed or accepted,
                // so the remote side can tie it to a roster key before any
                // protocol traffic flows. Known keys dedupe on arrival.
                let _ = tx.send(self.peer.join_message());
                self.conns.insert(conn, Conn { tx, key: None });
                Vec::new()
            }
            Inbound::Frame { conn, msg } => {
                self.learn_key(conn, &msg);
                match self.peer.handle_message(msg) {
                    Ok(actions) => actions,
                    Err(err) => {
                        debug!(conn, %err, "dropping invalid frame");
                        Vec::new()
                    }
                }
            }
            Inbound::Submit { msg, sig } => match self.peer.handle_request(msg, sig) {
                Ok(actions) => actions,
                Err(err) => {
                    warn!(%err, "transaction submission refused");
                    Vec::new()
                }
            },
            Inbound::Timer(id) => {
                self.timers.remove(&id);
                match self.peer.handle_timer(id) {
                    Ok(actions) => actions,
                    Err(err) => {
                        warn!(?id, %err, "timer handler failed");
                        Vec::new()
                    }
                }
            }
            Inbound::Disconnected { conn } => match self.conns.remove(&conn) {
                Some(Conn { key: Some(key), .. }) => {
                    info!(conn, %key, "peer connection lost");
                    self.peer.handle_peer_disconnect(&key)
                }
                _ => {
                    debug!(conn, "anonymous connection lost");
                    Vec::new()
                }
            },
            Inbound::Bootstrap => {
                if self.master {
                    self.peer.start_mining()
                } else {
                    vec![Action::Broadcast(self.peer.join_message())]
                }
            }
        };
        let alive = self.perform(actions)?;
        self.publish_view();
        Ok(alive)
    }

    fn learn_key(&mut self, conn: ConnId, msg: &PeerMessage) {
        let key = match msg {
            PeerMessage::Join { key } | PeerMessage::Synchronized { key } => Some(key.clone()),
            PeerMessage::Request { msg, .. } => Some(msg.client.clone()),
            _ => None,
        };
        if let Some(key) = key {
            if let Some(conn) = self.conns.get_mut(&conn) {
                conn.key = Some(key);
            }
        }
    }

    fn perform(&mut self, actions: Vec<Action>) -> Result<bool> {
        for action in actions {
            match action {
                Action::Broadcast(msg) => {
                    for conn in self.conns.values() {
                        let _ = conn.tx.send(msg.clone());
                    }
                }
                Action::Reply {
                    client,
                    result,
                    sig,
                } => {
                    let reply = PeerMessage::Reply { result, sig };
                    let mut routed = false;
                    for conn in self.conns.values() {
                        if conn.key.as_deref() == Some(client.as_str()) {
                            let _ = conn.tx.send(reply.clone());
                            routed = true;
                        }
                    }
                    if !routed {
                        debug!(%client, "no live connection for reply");
                    }
                }
                Action::SetTimer { id, duration } => self.arm_timer(id, duration),
                Action::CancelTimer(id) => {
                    if let Some(handle) = self.timers.remove(&id) {
                        handle.abort();
                    }
                }
                Action::PersistBlock(block) => self.store.append(&block)?,
                Action::PersistChain(chain) => self.store.replace(&chain)?,
                Action::Shutdown => {
                    error!("engine requested shutdown");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// (Re)arm a timer: one sleeping task per id, aborted on rearm or
    /// cancel. A timer that slips through an abort is harmless, the engine
    /// treats stale expirations as no-ops.
    fn arm_timer(&mut self, id: TimerId, duration: Duration) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(Inbound::Timer(id));
        });
        self.timers.insert(id, handle);
    }

    fn publish_view(&self) {
        let mut view = self.view.write();
        view.chain = self.peer.blockchain().chain().to_vec();
        view.accounts = self.peer.state().accounts.clone();
    }
}

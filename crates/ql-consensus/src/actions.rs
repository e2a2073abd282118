//! Effects requested by the engine.
//!
//! Handlers never touch sockets, disks or clocks. They return `Action`s and
//! the runtime carries them out, in order.

use shared_crypto::Signature;
use shared_types::{Block, PeerMessage, ReplyResult};
use std::time::Duration;

/// Logical timers owned by the engine. Arming an already-armed timer resets
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Periodic block proposal tick, armed only on the leader.
    Mine,
    /// Watchdog over the single in-flight consensus round.
    Consensus,
    /// Fail-fast watchdog over an unresolved view change.
    ViewChangeDeath,
    /// Settle delay after admitting a new peer.
    JoinSettle,
}

/// One effect for the runtime to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a message to every connected peer.
    Broadcast(PeerMessage),

    /// Send a signed commit receipt to the originating client.
    Reply {
        client: String,
        result: ReplyResult,
        sig: Signature,
    },

    /// Arm (or reset) a timer.
    SetTimer { id: TimerId, duration: Duration },

    /// Disarm a timer. Disarming an idle timer is a no-op.
    CancelTimer(TimerId),

    /// Durably append one finalized block.
    PersistBlock(Block),

    /// Durably replace the whole chain (sync adoption, rollback).
    PersistChain(Vec<Block>),

    /// Terminate the process. Emitted when a view change never resolves:
    /// a stuck replica must not keep serving stale state.
    Shutdown,
}

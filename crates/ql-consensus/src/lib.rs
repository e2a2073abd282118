//! # ql-consensus
//!
//! The consensus engine: a synchronous, I/O-free state machine implementing
//! a PBFT-style three-phase protocol over client transactions and mined
//! blocks, plus view-change recovery and roster membership.
//!
//! ## Architecture
//!
//! The engine is a single [`Peer`] value driven entirely by its caller. Every
//! handler consumes one input — a peer message, a client request, or a timer
//! firing — mutates the peer, and returns a list of [`Action`]s for the
//! runtime to carry out (broadcast a message, arm a timer, persist a block).
//! The engine never performs I/O and never spawns tasks, which makes the
//! whole protocol testable with plain synchronous unit tests.
//!
//! ## Concurrency discipline
//!
//! At most one consensus round — a transaction round or a block round — is in
//! flight at a time, tracked by [`PendingOp`]. Proposals arriving while a
//! round is open are parked in a FIFO queue and drained when the round
//! commits or is aborted.

pub mod actions;
pub mod config;
pub mod error;
pub mod peer;
pub mod quorum;
pub mod roster;

pub use actions::{Action, TimerId};
pub use config::PeerConfig;
pub use error::PeerError;
pub use peer::{Peer, PendingOp};
pub use quorum::{commit_quorum, prepare_quorum, VoteSet};
pub use roster::PeerRoster;

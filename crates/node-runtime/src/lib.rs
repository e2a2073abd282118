//! # QuorumLedger Node Runtime
//!
//! Everything outside the consensus engine: environment configuration,
//! telemetry, the HTTP/WebSocket gateway, peer bootstrap dialing, and the
//! runner task that owns the [`ql_consensus::Peer`].
//!
//! ## Threading model
//!
//! The engine is synchronous and single-owner. All inputs — WebSocket
//! frames, HTTP submissions, expired timers, disconnects — funnel into one
//! mpsc inbox consumed by the [`runner::Runner`] task, which executes each
//! handler to completion and performs the returned actions before taking
//! the next input. HTTP reads never touch the engine; they read a snapshot
//! the runner publishes after every input.

pub mod bootstrap;
pub mod config;
pub mod gateway;
pub mod runner;
pub mod telemetry;

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! relay_ledger is a Rust Programming Language implementation of a relay chain's ledger commitment
//! engine. It offers:
//! 1. A two-phase execute-then-submit pipeline that turns consensus-ordered blocks into durable chain state,
//! 2. Two compact Merkle accumulators committing to the full block history and to per-block state deltas,
//! 3. A small API [executor::TransactionExecutor] for plugging in arbitrary deterministic transaction execution,
//! 4. Pluggable persistence over any key-value store implementing [state::KVStore],
//! 5. and crash-safe commits: a restart replays exactly the heights a crash cut off, nothing more.

pub mod config;

pub mod events;

pub(crate) mod event_bus;
pub use event_bus::HandlerPtr;

pub mod executor;

pub mod ledger;

pub(crate) mod logging;

pub mod merkle;

pub mod state;

pub mod types;

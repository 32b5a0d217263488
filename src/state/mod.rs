/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable storage of committed chain state.
//!
//! The ledger persists into three logically separate stores, each backed by its own user-provided
//! [key-value store](kv_store::KVStore):
//! - the [block store](block_store::BlockStore): headers, bodies, the height-to-hash index, and
//!   the genesis version marker;
//! - the [state store](state_store::StateStore): both Merkle accumulators, per-height root
//!   records, cross-states records, and the committed key-value state;
//! - the [event store](event_store::EventStore): per-transaction execution notifications.
//!
//! Keeping the stores separate means their batches are committed in sequence rather than in one
//! distributed transaction; crash-safety comes from the
//! [recovery replay](crate::ledger::LedgerStore) being idempotent.

pub mod kv_store;
pub use kv_store::{KVGet, KVStore, WriteBatch};

pub mod paths;

pub(crate) mod utilities;

pub mod overlay;
pub use overlay::OverlayDB;

pub mod block_store;
pub use block_store::BlockStore;

pub mod state_store;
pub use state_store::StateStore;

pub mod event_store;
pub use event_store::EventStore;

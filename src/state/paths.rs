/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each persisted variable is stored in the user-provided
//! key-value stores.
//!
//! "Single values" (e.g., the current block record, the serialized accumulators) are stored at
//! one-byte constant keys. Mappings of the form "`A` -> `B`" (e.g., headers by block hash, state
//! roots by height) are stored at keys formed by [`combine`](super::utilities::combine)-ing the
//! variable's prefix with the Borsh serialization of an instance of `A`.
//!
//! The prefixes are unique across all three stores even though each store is backed by its own
//! `KVStore` instance, so that store handles can never be confused for one another.

// Block store
pub const BLOCK_HEADER: [u8; 1] = [0];
pub const BLOCK_BODY: [u8; 1] = [1];
pub const BLOCK_HASH_AT_HEIGHT: [u8; 1] = [2];
pub const CURRENT_BLOCK: [u8; 1] = [3];
pub const VERSION_MARKER: [u8; 1] = [4];
pub const HEADER_INDEX_BATCH: [u8; 1] = [5];

// State store
pub const BLOCK_MERKLE_TREE: [u8; 1] = [6];
pub const STATE_MERKLE_TREE: [u8; 1] = [7];
pub const STATE_ROOT_AT_HEIGHT: [u8; 1] = [8];
pub const CROSS_STATES_AT_HEIGHT: [u8; 1] = [9];
pub const CROSS_STATES_ROOT_AT_HEIGHT: [u8; 1] = [10];
pub const COMMITTED_STATE: [u8; 1] = [11];
pub const BOOKKEEPERS: [u8; 1] = [12];
pub const CURRENT_STATE_HEIGHT: [u8; 1] = [13];

// Event store
pub const EVENT_NOTIFY: [u8; 1] = [14];
pub const EVENT_TXS_AT_HEIGHT: [u8; 1] = [15];
pub const CURRENT_EVENT_HEIGHT: [u8; 1] = [16];

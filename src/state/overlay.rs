/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The read-through write-set view that transactions execute against.
//!
//! An [`OverlayDB`] is opened over the committed state for each block execution. Reads fall
//! through to the committed state unless the overlay holds a pending write for the key; writes
//! accumulate in the overlay and reach durable storage only when the commitment pipeline flushes
//! the block's [`WriteSet`]. The pending writes are kept ordered so that the overlay's
//! [change hash](OverlayDB::change_hash) is deterministic across nodes.

use std::collections::BTreeMap;

use borsh::BorshSerialize;
use sha2::Digest;

use super::kv_store::KVStore;
use super::paths;
use super::utilities::combine;
use crate::types::basic::{CryptoHash, WriteOp, WriteSet};
use crate::types::block::CryptoHasher;

pub struct OverlayDB<K: KVStore> {
    store: K,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<K: KVStore> OverlayDB<K> {
    pub(crate) fn new(store: K) -> OverlayDB<K> {
        OverlayDB {
            store,
            writes: BTreeMap::new(),
        }
    }

    /// The value at `key`: a pending write if one exists, the committed value otherwise.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(pending) => pending.clone(),
            None => self.store.get(&combine(&paths::COMMITTED_STATE, key)),
        }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.writes.insert(key, None);
    }

    /// The mutations accumulated so far, ordered ascending by key.
    pub fn write_set(&self) -> WriteSet {
        WriteSet::new(
            self.writes
                .iter()
                .map(|(key, value)| WriteOp {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        )
    }

    /// Deterministic content hash of the accumulated write set: the leaf value the delta-state
    /// tree accumulates for this block.
    pub fn change_hash(&self) -> CryptoHash {
        let bytes = self
            .write_set()
            .try_to_vec()
            .expect("Programming error: write set serialization is infallible.");
        CryptoHash::new(CryptoHasher::digest(&bytes).into())
    }
}

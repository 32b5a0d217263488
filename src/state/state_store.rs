/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state store: both Merkle accumulators, the per-height root records, the cross-states
//! records, the committed key-value state, and the bookkeeper set.
//!
//! # Dual persistence of state roots
//!
//! `add_state_merkle_tree_root` persists the delta-state tree's `(size, frontier)` blob *and* a
//! per-height `(change_hash, root)` pair. The blob is what continued appends need; the per-height
//! pair is what lets `get_state_merkle_root(height)` answer in O(1) instead of walking the tree.
//! Both records are required; do not merge them.
//!
//! # Fork-activation boundary
//!
//! The delta-state tree only exists from the configured fork-activation height onwards. Below the
//! fork, `add_state_merkle_tree_root` is a no-op and lookups report the empty hash; at exactly the
//! fork height the tree is reset to empty before the fork-height change hash becomes its first
//! leaf. Past the fork the tree's size must equal `current_height - fork_height + 1`; a violation
//! discovered on reload is a fatal integrity error.

use std::fmt::Display;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;

use super::kv_store::{KVGetError, KVSetError, KVStore, Key, WriteBatch};
use super::overlay::OverlayDB;
use super::paths;
use super::utilities::combine;
use crate::merkle::proof::{self, PathNode};
use crate::merkle::CompactMerkleTree;
use crate::types::basic::{BlockHeight, CryptoHash, PublicKeyBytes, TreeSize, WriteSet};
use crate::types::block::CryptoHasher;

pub struct StateStore<K: KVStore> {
    store: K,
    block_merkle_tree: CompactMerkleTree,
    state_merkle_tree: CompactMerkleTree,
    fork_height: BlockHeight,
}

impl<K: KVStore> StateStore<K> {
    /// Loads the accumulators from `store` and checks their sizes against the store's recorded
    /// current height.
    ///
    /// Size invariants: the block-history tree holds one leaf per committed height, so its size
    /// must be `current_height + 1`; once past the fork the delta-state tree's size must be
    /// `current_height - fork_height + 1`. A mismatch means the store is corrupt and is reported
    /// as [`StateStoreError::AccumulatorInconsistent`].
    pub fn open(store: K, fork_height: BlockHeight) -> Result<StateStore<K>, StateStoreError> {
        let block_merkle_tree = read_tree(&store, &paths::BLOCK_MERKLE_TREE, Key::BlockMerkleTree)?;
        let state_merkle_tree = read_tree(&store, &paths::STATE_MERKLE_TREE, Key::StateMerkleTree)?;

        let state_store = StateStore {
            store,
            block_merkle_tree,
            state_merkle_tree,
            fork_height,
        };

        match state_store.current_height()? {
            None => {
                if state_store.block_merkle_tree.size() != TreeSize::new(0) {
                    return Err(StateStoreError::AccumulatorInconsistent {
                        tree: Key::BlockMerkleTree,
                        expected: TreeSize::new(0),
                        got: state_store.block_merkle_tree.size(),
                    });
                }
            }
            Some(height) => {
                let expected = TreeSize::new(height.int() + 1);
                if state_store.block_merkle_tree.size() != expected {
                    return Err(StateStoreError::AccumulatorInconsistent {
                        tree: Key::BlockMerkleTree,
                        expected,
                        got: state_store.block_merkle_tree.size(),
                    });
                }
                if height >= fork_height {
                    let expected = TreeSize::new(height - fork_height + 1);
                    if state_store.state_merkle_tree.size() != expected {
                        return Err(StateStoreError::AccumulatorInconsistent {
                            tree: Key::StateMerkleTree,
                            expected,
                            got: state_store.state_merkle_tree.size(),
                        });
                    }
                }
            }
        }

        Ok(state_store)
    }

    /// A fresh read-through write-set view backed by the committed state. Side-effect-free.
    pub fn new_overlay_db(&self) -> OverlayDB<K> {
        OverlayDB::new(self.store.clone())
    }

    /// The committed value at `key`, if any.
    pub fn get_state_value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.get(&combine(&paths::COMMITTED_STATE, key))
    }

    /// The height whose state batch was most recently committed, or `None` before genesis. This is
    /// the low-water mark that restart recovery compares against the block store.
    pub fn current_height(&self) -> Result<Option<BlockHeight>, KVGetError> {
        if let Some(bytes) = self.store.get(&paths::CURRENT_STATE_HEIGHT) {
            Ok(Some(BlockHeight::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::CurrentStateHeight,
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Block-history tree ↓↓↓ */

    /// Appends `prev_block_hash` as the next leaf of the block-history tree and stages the updated
    /// `(size, frontier)` blob into `wb`.
    ///
    /// # Precondition
    ///
    /// Called at most once per height, in height order. Out-of-order appends are a programming
    /// error and are not defensively checked here.
    pub fn add_block_merkle_tree_root(
        &mut self,
        wb: &mut StateStoreWriteBatch<K::WriteBatch>,
        prev_block_hash: CryptoHash,
    ) -> Result<(), KVSetError> {
        self.block_merkle_tree.append(prev_block_hash);
        wb.set_tree(&paths::BLOCK_MERKLE_TREE, Key::BlockMerkleTree, &self.block_merkle_tree)
    }

    pub fn block_merkle_tree_size(&self) -> TreeSize {
        self.block_merkle_tree.size()
    }

    /// What the block-history root would be after appending `hashes`, without mutating the tree.
    pub fn block_merkle_root_with_new_hashes(&self, hashes: &[CryptoHash]) -> CryptoHash {
        self.block_merkle_tree.root_with_new_leaves(hashes)
    }

    /* ↓↓↓ Delta-state tree ↓↓↓ */

    /// Accumulates `change_hash` as the delta-state leaf for `height` and stages both persistence
    /// records (see the module docs). No-op below the fork-activation height; resets the tree at
    /// exactly the fork height.
    pub fn add_state_merkle_tree_root(
        &mut self,
        wb: &mut StateStoreWriteBatch<K::WriteBatch>,
        height: BlockHeight,
        change_hash: CryptoHash,
    ) -> Result<(), KVSetError> {
        if height < self.fork_height {
            return Ok(());
        }
        if height == self.fork_height {
            self.state_merkle_tree = CompactMerkleTree::new();
        }
        self.state_merkle_tree.append(change_hash);
        wb.set_tree(&paths::STATE_MERKLE_TREE, Key::StateMerkleTree, &self.state_merkle_tree)?;
        wb.set_state_root_at_height(height, change_hash, self.state_merkle_tree.root())
    }

    /// The `(change_hash, root)` pair recorded for `height`, or `None` for pre-fork heights and
    /// heights that have not been committed.
    pub fn get_state_merkle_pair(
        &self,
        height: BlockHeight,
    ) -> Result<Option<(CryptoHash, CryptoHash)>, KVGetError> {
        if height < self.fork_height {
            return Ok(None);
        }
        let key = combine(&paths::STATE_ROOT_AT_HEIGHT, &height.to_le_bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(
                <(CryptoHash, CryptoHash)>::deserialize(&mut &*bytes).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::StateRootAtHeight { height },
                        source: err,
                    }
                })?,
            ))
        } else {
            Ok(None)
        }
    }

    /// The state-merkle root for `height`, answered from the per-height record. The empty hash for
    /// pre-fork heights.
    pub fn get_state_merkle_root(&self, height: BlockHeight) -> Result<CryptoHash, KVGetError> {
        if height < self.fork_height {
            return Ok(CryptoHash::empty());
        }
        let (_change_hash, root) =
            self.get_state_merkle_pair(height)?
                .ok_or(KVGetError::ValueExpectedButNotFound {
                    key: Key::StateRootAtHeight { height },
                })?;
        Ok(root)
    }

    /// Pure projection: the state-merkle root that committing `change_hash` at `height` would
    /// produce. Mutates nothing; used to validate a proposed block's claimed root.
    pub fn get_state_merkle_root_with_new_hash(
        &self,
        height: BlockHeight,
        change_hash: CryptoHash,
    ) -> CryptoHash {
        if height < self.fork_height {
            CryptoHash::empty()
        } else if height == self.fork_height {
            CompactMerkleTree::new().root_with_new_leaves(&[change_hash])
        } else {
            self.state_merkle_tree.root_with_new_leaves(&[change_hash])
        }
    }

    /* ↓↓↓ Cross states ↓↓↓ */

    /// Stages the raw cross-states leaf list and its root for `height`. No-op if `hashes` is
    /// empty. The raw list is kept so inclusion paths can be reconstructed later.
    pub fn add_cross_states(
        &mut self,
        wb: &mut StateStoreWriteBatch<K::WriteBatch>,
        height: BlockHeight,
        hashes: &[CryptoHash],
        root: CryptoHash,
    ) -> Result<(), KVSetError> {
        if hashes.is_empty() {
            return Ok(());
        }
        wb.set_cross_states_at_height(height, hashes)?;
        wb.set_cross_states_root_at_height(height, root)
    }

    /// The cross-states leaf hashes committed at `height`, or `None` if that block emitted no
    /// cross-chain events.
    pub fn get_cross_states(
        &self,
        height: BlockHeight,
    ) -> Result<Option<Vec<CryptoHash>>, KVGetError> {
        let key = combine(&paths::CROSS_STATES_AT_HEIGHT, &height.to_le_bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(Vec::<CryptoHash>::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::CrossStatesAtHeight { height },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    /// The cross-states root committed at `height`; the empty hash if that block emitted no
    /// cross-chain events.
    pub fn get_cross_states_root(&self, height: BlockHeight) -> Result<CryptoHash, KVGetError> {
        let key = combine(&paths::CROSS_STATES_ROOT_AT_HEIGHT, &height.to_le_bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(CryptoHash::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::CrossStatesRootAtHeight { height },
                    source: err,
                }
            })?)
        } else {
            Ok(CryptoHash::empty())
        }
    }

    /// Reconstructs the inclusion path proving that the committed value at `key` was part of the
    /// cross-states root of `height`. The leaf proven is the Sha256 digest of the committed value,
    /// which is the leaf value executors emit for cross-chain state.
    pub fn get_cross_states_proof(
        &self,
        height: BlockHeight,
        key: &[u8],
    ) -> Result<Vec<PathNode>, StateStoreError> {
        let hashes = self
            .get_cross_states(height)?
            .ok_or(StateStoreError::CrossStatesLeafNotFound { height })?;
        let value = self
            .get_state_value(key)
            .ok_or(StateStoreError::StateValueNotFound)?;
        let leaf = CryptoHash::new(CryptoHasher::digest(&value).into());
        let index = hashes
            .iter()
            .position(|hash| *hash == leaf)
            .ok_or(StateStoreError::CrossStatesLeafNotFound { height })?;
        // Safety: index came from a position search over the same list.
        Ok(proof::inclusion_path(&hashes, index).unwrap())
    }

    /* ↓↓↓ Committed state and bookkeepers ↓↓↓ */

    /// Stages every mutation in `write_set` into the committed-state prefix.
    pub fn flush_write_set(
        &mut self,
        wb: &mut StateStoreWriteBatch<K::WriteBatch>,
        write_set: &WriteSet,
    ) {
        wb.apply_write_set(write_set)
    }

    pub fn get_bookkeepers(&self) -> Result<Option<Vec<PublicKeyBytes>>, KVGetError> {
        if let Some(bytes) = self.store.get(&paths::BOOKKEEPERS) {
            Ok(Some(
                Vec::<PublicKeyBytes>::deserialize(&mut &*bytes).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::Bookkeepers,
                        source: err,
                    }
                })?,
            ))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Lifecycle ↓↓↓ */

    /// Atomically applies `wb`.
    pub fn write(&mut self, wb: StateStoreWriteBatch<K::WriteBatch>) {
        self.store.write(wb.0)
    }

    /// Deletes everything in the state store and resets both accumulators. Used only during
    /// genesis (re-)initialization: batched delete over a full key iteration, atomically
    /// committed.
    pub fn clear_all(&mut self) {
        let mut wb = K::WriteBatch::new();
        for key in self.store.keys_with_prefix(&[]) {
            wb.delete(&key);
        }
        self.store.write(wb);
        self.block_merkle_tree = CompactMerkleTree::new();
        self.state_merkle_tree = CompactMerkleTree::new();
    }
}

fn read_tree<K: KVStore>(
    store: &K,
    path: &[u8],
    key: Key,
) -> Result<CompactMerkleTree, StateStoreError> {
    if let Some(bytes) = store.get(path) {
        Ok(CompactMerkleTree::deserialize(&mut &*bytes).map_err(|err| {
            StateStoreError::KVGet(KVGetError::DeserializeValueError { key, source: err })
        })?)
    } else {
        Ok(CompactMerkleTree::new())
    }
}

/// A typed write batch over the state store's variables.
pub struct StateStoreWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> StateStoreWriteBatch<W> {
    pub fn new() -> StateStoreWriteBatch<W> {
        StateStoreWriteBatch(W::new())
    }

    fn set_tree(
        &mut self,
        path: &[u8],
        key: Key,
        tree: &CompactMerkleTree,
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            path,
            &tree
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError { key, source: err })?,
        ))
    }

    fn set_state_root_at_height(
        &mut self,
        height: BlockHeight,
        change_hash: CryptoHash,
        root: CryptoHash,
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &combine(&paths::STATE_ROOT_AT_HEIGHT, &height.to_le_bytes()),
            &(change_hash, root)
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::StateRootAtHeight { height },
                    source: err,
                })?,
        ))
    }

    fn set_cross_states_at_height(
        &mut self,
        height: BlockHeight,
        hashes: &[CryptoHash],
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &combine(&paths::CROSS_STATES_AT_HEIGHT, &height.to_le_bytes()),
            &hashes
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::CrossStatesAtHeight { height },
                    source: err,
                })?,
        ))
    }

    fn set_cross_states_root_at_height(
        &mut self,
        height: BlockHeight,
        root: CryptoHash,
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &combine(&paths::CROSS_STATES_ROOT_AT_HEIGHT, &height.to_le_bytes()),
            &root
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::CrossStatesRootAtHeight { height },
                    source: err,
                })?,
        ))
    }

    fn apply_write_set(&mut self, write_set: &WriteSet) {
        for op in write_set.iter() {
            let key = combine(&paths::COMMITTED_STATE, &op.key);
            match &op.value {
                Some(value) => self.0.set(&key, value),
                None => self.0.delete(&key),
            }
        }
    }

    pub fn set_bookkeepers(&mut self, bookkeepers: &[PublicKeyBytes]) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &paths::BOOKKEEPERS,
            &bookkeepers
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::Bookkeepers,
                    source: err,
                })?,
        ))
    }

    pub fn set_current_height(&mut self, height: BlockHeight) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &paths::CURRENT_STATE_HEIGHT,
            &height
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::CurrentStateHeight,
                    source: err,
                })?,
        ))
    }
}

/// The ways reading from or committing into the state store can fail.
#[derive(Debug)]
pub enum StateStoreError {
    KVGet(KVGetError),

    KVSet(KVSetError),

    /// An accumulator's persisted size disagrees with the store's committed height. The store is
    /// corrupt; the node should not continue past this.
    AccumulatorInconsistent {
        tree: Key,
        expected: TreeSize,
        got: TreeSize,
    },

    /// No cross-states leaf matching the queried value was committed at `height`.
    CrossStatesLeafNotFound { height: BlockHeight },

    /// The queried key has no committed value, so there is nothing to prove.
    StateValueNotFound,
}

impl From<KVGetError> for StateStoreError {
    fn from(value: KVGetError) -> Self {
        StateStoreError::KVGet(value)
    }
}

impl From<KVSetError> for StateStoreError {
    fn from(value: KVSetError) -> Self {
        StateStoreError::KVSet(value)
    }
}

impl Display for StateStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateStoreError::KVGet(error) => write!(f, "{}", error),
            StateStoreError::KVSet(error) => write!(f, "{}", error),
            StateStoreError::AccumulatorInconsistent {
                tree,
                expected,
                got,
            } => write!(
                f,
                "accumulator inconsistent with committed height: tree: {}, expected size: {}, got: {}",
                tree, expected, got
            ),
            StateStoreError::CrossStatesLeafNotFound { height } => {
                write!(f, "no matching cross-states leaf at height {}", height)
            }
            StateStoreError::StateValueNotFound => {
                write!(f, "queried key has no committed value")
            }
        }
    }
}

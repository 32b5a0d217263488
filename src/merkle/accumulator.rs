/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The compact Merkle accumulator persisted by the state store.
//!
//! A [`CompactMerkleTree`] stores only `(size, frontier)`: the leaf count and the roots of the
//! maximal complete subtrees, largest subtree first. That is enough to append leaves and to
//! compute the current root, which is what the commitment pipeline needs; historical roots are
//! persisted separately per height by the state store.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{hash_children, hash_empty};
use crate::types::basic::{CryptoHash, TreeSize};

/// An append-only Merkle tree in compact form. Leaves are values that are already hashes (block
/// hashes, write-set change hashes) and are appended as-is.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CompactMerkleTree {
    size: u64,
    frontier: Vec<CryptoHash>,
}

impl CompactMerkleTree {
    pub fn new() -> CompactMerkleTree {
        CompactMerkleTree {
            size: 0,
            frontier: Vec::new(),
        }
    }

    pub fn size(&self) -> TreeSize {
        TreeSize::new(self.size)
    }

    /// Appends `leaf` as the tree's next leaf.
    ///
    /// Merges complete sibling subtrees as it goes: after the append, `frontier` again holds one
    /// hash per set bit of `size`, largest subtree first.
    pub fn append(&mut self, leaf: CryptoHash) {
        let mut node = leaf;
        let mut size = self.size;
        while size & 1 == 1 {
            // The frontier's last entry is the complete subtree that `node` is the right sibling
            // of.
            let left = self
                .frontier
                .pop()
                .expect("Programming error: frontier shorter than the set bits of size.");
            node = hash_children(&left, &node);
            size >>= 1;
        }
        self.frontier.push(node);
        self.size += 1;
    }

    /// The current root: the right-to-left fold of the frontier. Equal to
    /// [`proof::tree_root`](super::proof::tree_root) over the same leaf sequence.
    pub fn root(&self) -> CryptoHash {
        match self.frontier.split_last() {
            None => hash_empty(),
            Some((last, rest)) => rest
                .iter()
                .rev()
                .fold(*last, |acc, left| hash_children(left, &acc)),
        }
    }

    /// Computes what [`root`](Self::root) would return after appending `leaves`, without mutating
    /// the tree. Used to validate a proposed block's claimed root before committing anything.
    pub fn root_with_new_leaves(&self, leaves: &[CryptoHash]) -> CryptoHash {
        let mut projection = self.clone();
        for leaf in leaves {
            projection.append(*leaf);
        }
        projection.root()
    }
}

impl Default for CompactMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

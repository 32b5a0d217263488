/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Full-tree Merkle roots and inclusion paths over explicit leaf lists.
//!
//! The cross-states record persisted per height keeps the full leaf list, so proofs are built by
//! recomputing the tree over that list rather than by storing interior nodes.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{hash_children, hash_empty};
use crate::types::basic::CryptoHash;

/// One step of an inclusion path: the sibling hash at a level, and which side of the running hash
/// it sits on.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PathNode {
    pub hash: CryptoHash,
    /// True if `hash` is the left child at this level.
    pub is_left: bool,
}

/// Root of a full Merkle tree over `leaves`. A tree over `n > 1` leaves splits at the largest
/// power of two strictly smaller than `n`; a single-leaf tree's root is the leaf itself.
pub fn tree_root(leaves: &[CryptoHash]) -> CryptoHash {
    match leaves {
        [] => hash_empty(),
        [leaf] => *leaf,
        _ => {
            let k = largest_power_of_two_below(leaves.len());
            hash_children(&tree_root(&leaves[..k]), &tree_root(&leaves[k..]))
        }
    }
}

/// Builds the inclusion path for `leaves[index]`, ordered from the leaf's sibling up to the root's
/// child. Returns `None` if `index` is out of bounds.
pub fn inclusion_path(leaves: &[CryptoHash], index: usize) -> Option<Vec<PathNode>> {
    if index >= leaves.len() {
        return None;
    }
    let mut path = Vec::new();
    build_path(leaves, index, &mut path);
    Some(path)
}

fn build_path(leaves: &[CryptoHash], index: usize, path: &mut Vec<PathNode>) {
    if leaves.len() <= 1 {
        return;
    }
    let k = largest_power_of_two_below(leaves.len());
    if index < k {
        build_path(&leaves[..k], index, path);
        path.push(PathNode {
            hash: tree_root(&leaves[k..]),
            is_left: false,
        });
    } else {
        build_path(&leaves[k..], index - k, path);
        path.push(PathNode {
            hash: tree_root(&leaves[..k]),
            is_left: true,
        });
    }
}

/// Checks that `path` proves the inclusion of `leaf` in the tree with the given `root`.
pub fn verify(leaf: CryptoHash, path: &[PathNode], root: CryptoHash) -> bool {
    let computed = path.iter().fold(leaf, |acc, node| {
        if node.is_left {
            hash_children(&node.hash, &acc)
        } else {
            hash_children(&acc, &node.hash)
        }
    });
    computed == root
}

/// The largest power of two strictly smaller than `n`. `n` must be at least 2.
fn largest_power_of_two_below(n: usize) -> usize {
    debug_assert!(n >= 2);
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}

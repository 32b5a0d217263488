/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Append-only Merkle accumulators and inclusion proofs.
//!
//! The ledger maintains two independent accumulators (the block-history tree and the delta-state
//! tree) as [`CompactMerkleTree`]s, and computes full-tree roots and inclusion paths over
//! cross-states leaf lists with the functions in [`proof`]. Both follow the same tree shape: a
//! tree over `n` leaves splits at the largest power of two strictly smaller than `n`, so the
//! accumulator's incrementally maintained root and [`proof::tree_root`] agree for every leaf
//! sequence.

pub mod accumulator;
pub use accumulator::CompactMerkleTree;

pub mod proof;

use sha2::Digest;

use crate::types::basic::CryptoHash;
use crate::types::block::CryptoHasher;

/// Root of a tree with no leaves.
pub(crate) fn hash_empty() -> CryptoHash {
    CryptoHash::new(CryptoHasher::new().finalize().into())
}

/// Hash of an interior node. The `0x01` domain-separation prefix keeps interior nodes distinct
/// from leaf values.
pub(crate) fn hash_children(left: &CryptoHash, right: &CryptoHash) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update([1u8]);
    hasher.update(left.bytes());
    hasher.update(right.bytes());
    CryptoHash::new(hasher.finalize().into())
}

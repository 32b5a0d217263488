/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`KVStore`] trait, which specifies the required interface for the key-value persistence
//! engine provided by the user, and the error types reported when reading or writing the ledger's
//! persisted variables through it.
//!
//! All persisted values are Borsh-serialized and stored under keys formed from the byte prefixes
//! in [`paths`](super::paths).

use std::fmt::Display;

use crate::types::basic::{BlockHeight, CryptoHash};

/// A handle to an atomically-committable key-value store. Handles are cheaply cloneable and share
/// the same underlying storage.
pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Atomically applies every mutation accumulated in `wb`.
    fn write(&mut self, wb: Self::WriteBatch);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Every key currently in the store that starts with `prefix`, in ascending order. An empty
    /// prefix lists every key.
    fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>>;
}

/// An ordered set of mutations applied atomically by [`KVStore::write`].
pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Identifies the persisted variable involved in a [`KVGetError`] or [`KVSetError`].
#[derive(Clone, Debug)]
pub enum Key {
    BlockHeader { block: CryptoHash },
    BlockBody { block: CryptoHash },
    BlockHashAtHeight { height: BlockHeight },
    CurrentBlock,
    VersionMarker,
    HeaderIndexBatch { batch: u64 },
    BlockMerkleTree,
    StateMerkleTree,
    StateRootAtHeight { height: BlockHeight },
    CrossStatesAtHeight { height: BlockHeight },
    CrossStatesRootAtHeight { height: BlockHeight },
    Bookkeepers,
    CurrentStateHeight,
    EventNotify { transaction: CryptoHash },
    EventTxsAtHeight { height: BlockHeight },
    CurrentEventHeight,
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::BlockHeader { block } => write!(f, "Block Header, block: {:?}", block),
            Key::BlockBody { block } => write!(f, "Block Body, block: {:?}", block),
            Key::BlockHashAtHeight { height } => {
                write!(f, "Block Hash at Height, height: {}", height)
            }
            Key::CurrentBlock => write!(f, "Current Block"),
            Key::VersionMarker => write!(f, "Version Marker"),
            Key::HeaderIndexBatch { batch } => write!(f, "Header Index Batch, batch: {}", batch),
            Key::BlockMerkleTree => write!(f, "Block-History Merkle Tree"),
            Key::StateMerkleTree => write!(f, "Delta-State Merkle Tree"),
            Key::StateRootAtHeight { height } => {
                write!(f, "State Root at Height, height: {}", height)
            }
            Key::CrossStatesAtHeight { height } => {
                write!(f, "Cross States at Height, height: {}", height)
            }
            Key::CrossStatesRootAtHeight { height } => {
                write!(f, "Cross-States Root at Height, height: {}", height)
            }
            Key::Bookkeepers => write!(f, "Bookkeepers"),
            Key::CurrentStateHeight => write!(f, "Current State Height"),
            Key::EventNotify { transaction } => {
                write!(f, "Event Notify, transaction: {:?}", transaction)
            }
            Key::EventTxsAtHeight { height } => {
                write!(f, "Event Transactions at Height, height: {}", height)
            }
            Key::CurrentEventHeight => write!(f, "Current Event Height"),
        }
    }
}

/// Error when trying to read a persisted variable from a [`KVStore`].
#[derive(Debug)]
pub enum KVGetError {
    /// The variable is expected to exist given an invariant the store maintains, but was not
    /// found.
    ValueExpectedButNotFound { key: Key },

    /// The variable's stored bytes failed to deserialize into its expected type.
    DeserializeValueError { key: Key, source: std::io::Error },
}

impl Display for KVGetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KVGetError::ValueExpectedButNotFound { key } => {
                write!(f, "value expected but not found: key: {}", key)
            }
            KVGetError::DeserializeValueError { key, source } => {
                write!(f, "failed to deserialize value: key: {}, error: {}", key, source)
            }
        }
    }
}

/// Error when trying to serialize a variable for persistence into a [`KVStore`].
#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: std::io::Error },
}

impl Display for KVSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KVSetError::SerializeValueError { key, source } => {
                write!(f, "failed to serialize value: key: {}, error: {}", key, source)
            }
        }
    }
}

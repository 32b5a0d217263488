/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The trait implemented by the native-contract virtual machine that the ledger calls out to when
//! executing a block's transactions.

use std::fmt::Display;

use crate::state::kv_store::KVStore;
use crate::state::overlay::OverlayDB;
use crate::types::basic::{BlockHeight, CryptoHash, Notification};
use crate::types::block::Transaction;

/// A deterministic transaction executor.
///
/// Besides implementing `execute`, implementors are expected to be *deterministic*: called with
/// the same overlay contents, block context, and transaction, `execute` must apply the same writes
/// and return the same output every time. The commitment pipeline relies on this both to validate
/// proposed state roots and to re-execute blocks during restart recovery.
pub trait TransactionExecutor<K: KVStore>: Send + Sync + 'static {
    /// Applies `transaction` to `overlay`.
    ///
    /// # Return value
    ///
    /// The notifications the transaction emitted, plus the Merkle leaf hashes of any cross-chain
    /// state it produced. A cross-state leaf hash must be the Sha256 digest of the value the
    /// executor wrote into the overlay for that state, so that inclusion proofs can later be
    /// reconstructed from the committed value.
    fn execute(
        &self,
        overlay: &mut OverlayDB<K>,
        context: &BlockContext,
        transaction: &Transaction,
    ) -> Result<TransactionOutput, ExecutionError>;
}

/// The block-level context an executor may read while executing one of the block's transactions.
pub struct BlockContext {
    pub height: BlockHeight,
    pub block_hash: CryptoHash,
    pub timestamp: u64,
}

/// What executing one transaction produced, besides its overlay writes.
pub struct TransactionOutput {
    pub notifications: Vec<Notification>,
    pub cross_state_hashes: Vec<CryptoHash>,
}

/// Enumerates the circumstances in which an executor could reject a transaction, aborting the
/// execution of the block containing it.
#[derive(Debug)]
pub enum ExecutionError {
    /// The transaction's payload could not be interpreted.
    InvalidPayload,

    /// A native contract rejected the transaction.
    ContractFailure { reason: String },
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::InvalidPayload => write!(f, "invalid transaction payload"),
            ExecutionError::ContractFailure { reason } => {
                write!(f, "contract failure: {}", reason)
            }
        }
    }
}

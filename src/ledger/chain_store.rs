/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The chain store: the consensus-facing cache that defers durable submission by one block.
//!
//! Consensus needs a block's execution roots *before* the network has agreed on the block, so the
//! chain store executes each arriving block immediately but keeps the result pending, and only
//! submits a block once its successor arrives. The pipeline at steady state is therefore: block
//! `h` arrives, blocks up to `h - 1` get submitted, block `h` gets executed and cached.
//!
//! A failed deferred submission is logged and announced as a
//! [`SubmitFailureEvent`](crate::events::SubmitFailureEvent), and the pending result is kept so
//! submission is retried from the oldest unsubmitted height the next time a block arrives. Only
//! the submit error itself is swallowed: the arriving block is still executed against the ledger's
//! unadvanced height, so its own execution error (a height mismatch, while older blocks remain
//! unsubmitted) is returned to the caller and the arrival is not cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::events::{Event, SubmitFailureEvent};
use crate::executor::TransactionExecutor;
use crate::state::kv_store::KVStore;
use crate::types::basic::{BlockHeight, CryptoHash, WriteSet};
use crate::types::block::Block;

use super::ledger_store::{ExecuteResult, LedgerError, LedgerStore};

pub struct ChainStore<K: KVStore, E: TransactionExecutor<K>> {
    ledger: Arc<LedgerStore<K, E>>,
    inner: Mutex<ChainStoreInner>,
}

struct ChainStoreInner {
    /// The highest height that has been executed (pending or committed).
    chained_height: Option<BlockHeight>,
    pending_blocks: HashMap<BlockHeight, PendingBlock>,
}

struct PendingBlock {
    block: Block,
    exec_result: ExecuteResult,
}

impl<K: KVStore, E: TransactionExecutor<K>> ChainStore<K, E> {
    /// Opens a chain store over an initialized ledger. Starts with no pending blocks; the chained
    /// height is seeded from the ledger's committed height.
    pub fn open(ledger: Arc<LedgerStore<K, E>>) -> ChainStore<K, E> {
        let chained_height = ledger.current_block_height();
        ChainStore {
            ledger,
            inner: Mutex::new(ChainStoreInner {
                chained_height,
                pending_blocks: HashMap::new(),
            }),
        }
    }

    /// The ledger this chain store fronts. Committed-height reads can go straight here.
    pub fn ledger(&self) -> &Arc<LedgerStore<K, E>> {
        &self.ledger
    }

    /// The highest executed height, pending or committed.
    pub fn chained_height(&self) -> Option<BlockHeight> {
        self.inner.lock().expect(POISONED_LOCK).chained_height
    }

    /// Accepts the next block of the chain: submits every older unsubmitted pending block, then
    /// executes `block` and caches its result as the new pending tip.
    ///
    /// No-op for heights at or below the chained height. Execution failures and root mismatches
    /// for `block` itself are returned to the caller; deferred-submission failures of *older*
    /// blocks are logged and retried later instead (see the module docs).
    pub fn add_block(&self, block: &Block) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().expect(POISONED_LOCK);
        let height = block.height();

        if let Some(chained_height) = inner.chained_height {
            if height <= chained_height {
                return Ok(());
            }
        }
        let expected = match inner.chained_height {
            None => match self.ledger.current_block_height() {
                None => BlockHeight::new(0),
                Some(current) => current + 1,
            },
            Some(chained_height) => chained_height + 1,
        };
        if height != expected {
            return Err(LedgerError::HeightMismatch {
                expected,
                got: height,
            });
        }

        self.submit_pending_below(&mut inner, height);

        let exec_result = self.ledger.execute_block(block)?;
        inner.pending_blocks.insert(
            height,
            PendingBlock {
                block: block.clone(),
                exec_result,
            },
        );
        inner.chained_height = Some(height);
        Ok(())
    }

    /// Submits every unsubmitted pending block strictly below `height`, oldest first, stopping at
    /// the first failure. A failure leaves the pending result in place for a later retry; a
    /// success drops the entry, since committed heights are readable from the ledger.
    fn submit_pending_below(&self, inner: &mut ChainStoreInner, height: BlockHeight) {
        let mut next = match self.ledger.current_block_height() {
            None => BlockHeight::new(0),
            Some(current) => current + 1,
        };
        while next < height {
            let pending = match inner.pending_blocks.get(&next) {
                Some(pending) => pending,
                None => break,
            };
            match self
                .ledger
                .submit_block(&pending.block, pending.exec_result.clone())
            {
                Ok(()) => {
                    inner.pending_blocks.remove(&next);
                }
                Err(error) => {
                    log::warn!("deferred submission of block {} failed: {}", next, error);
                    self.ledger.publish(Event::SubmitFailure(SubmitFailureEvent {
                        timestamp: SystemTime::now(),
                        height: next,
                        reason: error.to_string(),
                    }));
                    break;
                }
            }
            next += 1;
        }
    }

    /// Drops every pending result the ledger has since committed (or superseded) and re-seeds the
    /// chained height. Called after the ledger is recovered or synced out from under the cache.
    pub fn reload_from_ledger(&self) {
        let mut inner = self.inner.lock().expect(POISONED_LOCK);
        let current = self.ledger.current_block_height();
        if let Some(current) = current {
            inner
                .pending_blocks
                .retain(|pending_height, _| *pending_height > current);
        }
        inner.chained_height = inner
            .pending_blocks
            .keys()
            .max()
            .copied()
            .or(current);
    }

    /* ↓↓↓ Read accessors over the pending tip ↓↓↓ */

    /// The state-merkle root at `height`, answered from the pending cache first and the committed
    /// ledger second. This is what consensus reads when validating a proposal whose parent has not
    /// been submitted yet.
    pub fn get_exec_merkle_root(&self, height: BlockHeight) -> Result<CryptoHash, LedgerError> {
        {
            let inner = self.inner.lock().expect(POISONED_LOCK);
            if let Some(pending) = inner.pending_blocks.get(&height) {
                return Ok(pending.exec_result.state_root);
            }
        }
        self.ledger.get_state_merkle_root(height)
    }

    /// The cross-states root at `height`, pending cache first.
    pub fn get_cross_states_root(&self, height: BlockHeight) -> Result<CryptoHash, LedgerError> {
        {
            let inner = self.inner.lock().expect(POISONED_LOCK);
            if let Some(pending) = inner.pending_blocks.get(&height) {
                return Ok(pending.exec_result.cross_states_root);
            }
        }
        self.ledger.get_cross_states_root(height)
    }

    /// The write set staged at a pending `height`. `None` once the height is committed: committed
    /// write sets are folded into state and no longer kept.
    pub fn get_exec_write_set(&self, height: BlockHeight) -> Option<WriteSet> {
        let inner = self.inner.lock().expect(POISONED_LOCK);
        inner
            .pending_blocks
            .get(&height)
            .map(|pending| pending.exec_result.write_set.clone())
    }

    /// The pending block at `height`, if one is cached.
    pub fn get_pending_block(&self, height: BlockHeight) -> Option<Block> {
        let inner = self.inner.lock().expect(POISONED_LOCK);
        inner
            .pending_blocks
            .get(&height)
            .map(|pending| pending.block.clone())
    }
}

const POISONED_LOCK: &str = "Programming error: the chain store lock was poisoned.";

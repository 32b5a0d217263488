/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The ledger store: the component that turns an ordered stream of blocks into durable,
//! cryptographically-verifiable chain state.
//!
//! # The two-phase pipeline
//!
//! Each height moves through two phases, driven by two entry points:
//!
//! ```text
//! UNEXECUTED --execute_block--> EXECUTED --submit_block--> COMMITTED
//! ```
//!
//! [`execute_block`](LedgerStore::execute_block) applies the block's transactions against a fresh
//! overlay and computes every root the block commits to, but durably changes *nothing*.
//! [`submit_block`](LedgerStore::submit_block) verifies the header's declared block root against
//! the block-history accumulator and then commits three write batches, in this order: the block
//! store's, the event store's, and the state store's. The state store's current-height record is
//! therefore the last thing to advance, and restart [recovery](LedgerSpec::open) re-executes and
//! re-applies exactly the heights whose state batch a crash cut off. Both entry points are
//! idempotent for already-committed heights, which is what makes that replay safe.
//!
//! # The commit gate
//!
//! Every durable commit is serialized through one mutex. The consensus-facing paths
//! (`execute_block`, `submit_block`) acquire it blockingly; the sync path
//! ([`add_block`](LedgerStore::add_block)) try-acquires and skips its block if a commit is already
//! in flight, so the same block is never processed twice concurrently.

use std::fmt::Display;
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, RwLock, TryLockError};
use std::thread::JoinHandle;
use std::time::SystemTime;

use typed_builder::TypedBuilder;

use crate::config::LedgerConfig;
use crate::event_bus::{start_event_bus, EventHandlers, HandlerPtr};
use crate::events::*;
use crate::executor::{BlockContext, ExecutionError, TransactionExecutor};
use crate::logging::Logger;
use crate::merkle::proof::{self, PathNode};
use crate::state::block_store::{BlockStore, BlockStoreWriteBatch};
use crate::state::event_store::{EventStore, EventStoreWriteBatch};
use crate::state::kv_store::{KVGetError, KVSetError, KVStore, Key};
use crate::state::overlay::OverlayDB;
use crate::state::state_store::{StateStore, StateStoreError, StateStoreWriteBatch};
use crate::types::basic::{
    BlockHeight, ChainID, CryptoHash, Notification, PublicKeyBytes, WriteSet,
};
use crate::types::block::Block;

/// The version marker written into the block store at genesis. Bump on incompatible layout
/// changes.
pub const LEDGER_VERSION: u32 = 1;

/// The output of applying one block's transactions: everything `submit_block` needs to durably
/// commit the block. Created by execution, consumed exactly once by submission.
#[derive(Clone)]
pub struct ExecuteResult {
    /// Root of the delta-state tree after this block's change hash is appended.
    pub state_root: CryptoHash,
    /// Root over `cross_state_hashes`; the empty hash if the block emitted none.
    pub cross_states_root: CryptoHash,
    /// Cross-chain Merkle leaves emitted by this block's transactions, in emission order.
    pub cross_state_hashes: Vec<CryptoHash>,
    /// Content hash of `write_set`: the delta-state leaf for this block.
    pub change_hash: CryptoHash,
    /// The key-value mutations this block's execution produced.
    pub write_set: WriteSet,
    /// Per-transaction notifications, keyed by transaction hash.
    pub notifications: Vec<(CryptoHash, Vec<Notification>)>,
}

/// Specification of a ledger store, built with the builder pattern:
///
/// ```ignore
/// let ledger = LedgerSpec::builder()
///     .block_kv(block_kv)
///     .state_kv(state_kv)
///     .event_kv(event_kv)
///     .executor(executor)
///     .config(config)
///     .on_commit_block(vec![Box::new(|event| { /* ... */ })])
///     .build()
///     .open()?;
/// ledger.initialize(&genesis_block, &bookkeepers)?;
/// ```
///
/// The three key-value stores must be distinct instances: their batches are committed in sequence,
/// and recovery relies on each store's own current-height record.
#[derive(TypedBuilder)]
pub struct LedgerSpec<K: KVStore, E: TransactionExecutor<K>> {
    block_kv: K,
    state_kv: K,
    event_kv: K,
    executor: E,
    config: LedgerConfig,
    #[builder(default = Vec::new())]
    on_execute_block: Vec<HandlerPtr<ExecuteBlockEvent>>,
    #[builder(default = Vec::new())]
    on_commit_block: Vec<HandlerPtr<CommitBlockEvent>>,
    #[builder(default = Vec::new())]
    on_flush_header_index: Vec<HandlerPtr<FlushHeaderIndexEvent>>,
    #[builder(default = Vec::new())]
    on_submit_failure: Vec<HandlerPtr<SubmitFailureEvent>>,
}

impl<K: KVStore, E: TransactionExecutor<K>> LedgerSpec<K, E> {
    /// Opens the ledger store: loads both accumulators (failing on a size-integrity violation),
    /// rebuilds the in-memory header index, and starts the event bus if any handler is registered
    /// or `log_events` is set. Does not run genesis or recovery; call
    /// [`initialize`](LedgerStore::initialize) next.
    pub fn open(self) -> Result<LedgerStore<K, E>, LedgerError> {
        let block_store = BlockStore::new(self.block_kv);
        let state_store = StateStore::open(self.state_kv, self.config.state_fork_height)?;
        let event_store = EventStore::new(self.event_kv);

        let current = block_store.current_block()?;
        let header_index = HeaderIndex::load(&block_store)?;

        let mut handlers = EventHandlers {
            execute_block_handlers: self.on_execute_block,
            commit_block_handlers: self.on_commit_block,
            flush_header_index_handlers: self.on_flush_header_index,
            submit_failure_handlers: self.on_submit_failure,
        };
        if self.config.log_events {
            handlers.execute_block_handlers.push(ExecuteBlockEvent::get_logger());
            handlers.commit_block_handlers.push(CommitBlockEvent::get_logger());
            handlers
                .flush_header_index_handlers
                .push(FlushHeaderIndexEvent::get_logger());
            handlers.submit_failure_handlers.push(SubmitFailureEvent::get_logger());
        }

        let (event_publisher, event_bus) = if handlers.is_empty() {
            (None, None)
        } else {
            let (event_sender, event_receiver) = mpsc::channel();
            let (shutdown_sender, shutdown_receiver) = mpsc::channel();
            let handle = start_event_bus(handlers, event_receiver, shutdown_receiver);
            (
                Some(Mutex::new(event_sender)),
                Some((shutdown_sender, handle)),
            )
        };

        Ok(LedgerStore {
            pipeline: Mutex::new(Pipeline {
                block_store,
                state_store,
                event_store,
            }),
            header_index: Mutex::new(header_index),
            current: RwLock::new(current),
            executor: self.executor,
            config: self.config,
            event_publisher,
            event_bus,
        })
    }
}

/// The stores mutated by durable commits. Guarded as one unit by the commit gate.
struct Pipeline<K: KVStore> {
    block_store: BlockStore<K>,
    state_store: StateStore<K>,
    event_store: EventStore<K>,
}

pub struct LedgerStore<K: KVStore, E: TransactionExecutor<K>> {
    pipeline: Mutex<Pipeline<K>>,
    header_index: Mutex<HeaderIndex>,
    current: RwLock<Option<(BlockHeight, CryptoHash)>>,
    executor: E,
    config: LedgerConfig,
    event_publisher: Option<Mutex<Sender<Event>>>,
    event_bus: Option<(Sender<()>, JoinHandle<()>)>,
}

impl<K: KVStore, E: TransactionExecutor<K>> LedgerStore<K, E> {
    /* ↓↓↓ Lifecycle ↓↓↓ */

    /// Initializes the ledger's stores.
    ///
    /// On a first run (no version marker), clears all three stores, persists `bookkeepers`,
    /// executes and submits `genesis_block`, and records the version marker. On subsequent runs,
    /// verifies that the stored genesis hash matches `genesis_block` and replays restart recovery
    /// instead: every height whose block-store commit survived a crash but whose event/state-store
    /// commits did not is re-executed and re-applied.
    pub fn initialize(
        &self,
        genesis_block: &Block,
        bookkeepers: &[PublicKeyBytes],
    ) -> Result<(), LedgerError> {
        self.check_chain_id(genesis_block)?;
        let mut pipeline = self.lock_pipeline();

        if pipeline.block_store.version()?.is_none() {
            log::info!("initializing chain from genesis block");
            pipeline.block_store.clear_all();
            pipeline.state_store.clear_all();
            pipeline.event_store.clear_all();
            self.header_index.lock().expect(POISONED_LOCK).reset();
            *self.current.write().expect(POISONED_LOCK) = None;

            let mut wb = StateStoreWriteBatch::new();
            wb.set_bookkeepers(bookkeepers)?;
            pipeline.state_store.write(wb);

            let result = self.execute_unchecked(&pipeline, genesis_block)?;
            self.save_block(&mut pipeline, genesis_block, &result, true)?;
        } else {
            let stored = pipeline
                .block_store
                .get_block_hash_at_height(BlockHeight::new(0))?
                .ok_or(LedgerError::BlockExpectedButNotFound {
                    height: BlockHeight::new(0),
                })?;
            if stored != genesis_block.hash() {
                return Err(LedgerError::GenesisMismatch {
                    stored,
                    supplied: genesis_block.hash(),
                });
            }
            self.recover(&mut pipeline)?;
        }

        Ok(())
    }

    /// Stops the event bus thread, if one was started, and consumes the ledger.
    pub fn close(self) {
        if let Some((shutdown_sender, handle)) = self.event_bus {
            shutdown_sender
                .send(())
                .expect("event_bus thread disconnected from main thread");
            handle.join().expect("event_bus thread panicked");
        }
    }

    /* ↓↓↓ The commitment pipeline ↓↓↓ */

    /// Applies `block`'s transactions and computes the roots it would commit. Durably changes
    /// nothing: every effect is staged in the returned [`ExecuteResult`].
    ///
    /// Idempotent for already-committed heights: returns the committed roots without re-executing,
    /// with an empty write set. Consensus re-requests execution for the same height during view
    /// changes, so this path must not error.
    pub fn execute_block(&self, block: &Block) -> Result<ExecuteResult, LedgerError> {
        let pipeline = self.lock_pipeline();
        self.execute_block_locked(&pipeline, block)
    }

    /// Durably commits a block previously staged by [`execute_block`](Self::execute_block).
    /// Idempotent no-op for already-committed heights; fails without mutating anything on a height
    /// mismatch or if the header's declared block root does not match the accumulator-derived
    /// root (the primary fork/equivocation guard).
    pub fn submit_block(&self, block: &Block, result: ExecuteResult) -> Result<(), LedgerError> {
        let mut pipeline = self.lock_pipeline();
        self.submit_block_locked(&mut pipeline, block, &result)
    }

    /// Convenience path used by non-consensus sync: executes `block`, compares the resulting state
    /// root to `claimed_state_root`, and submits only on a match.
    ///
    /// Try-acquires the commit gate: if another commit is in flight the block is skipped (and will
    /// be re-delivered by the sync protocol), so a block is never processed twice concurrently.
    pub fn add_block(
        &self,
        block: &Block,
        claimed_state_root: CryptoHash,
    ) -> Result<(), LedgerError> {
        let mut pipeline = match self.pipeline.try_lock() {
            Ok(pipeline) => pipeline,
            Err(TryLockError::WouldBlock) => {
                log::debug!("block {} skipped: a commit is already in flight", block.height());
                return Ok(());
            }
            Err(TryLockError::Poisoned(_)) => panic!("{}", POISONED_LOCK),
        };

        if let Some((current_height, _)) = *self.current.read().expect(POISONED_LOCK) {
            if block.height() <= current_height {
                return Ok(());
            }
        }

        let result = self.execute_block_locked(&pipeline, block)?;
        if result.state_root != claimed_state_root {
            return Err(LedgerError::StateRootMismatch {
                height: block.height(),
                claimed: claimed_state_root,
                computed: result.state_root,
            });
        }
        self.submit_block_locked(&mut pipeline, block, &result)
    }

    fn execute_block_locked(
        &self,
        pipeline: &Pipeline<K>,
        block: &Block,
    ) -> Result<ExecuteResult, LedgerError> {
        let height = block.height();
        self.check_chain_id(block)?;
        let current = *self.current.read().expect(POISONED_LOCK);

        if let Some((current_height, _)) = current {
            if height <= current_height {
                return self.replay_execute_result(pipeline, height);
            }
        }

        let expected = match current {
            None => BlockHeight::new(0),
            Some((current_height, _)) => current_height + 1,
        };
        if height != expected {
            return Err(LedgerError::HeightMismatch {
                expected,
                got: height,
            });
        }

        self.execute_unchecked(pipeline, block)
    }

    /// Executes `block` against a fresh overlay without checking it against the current height.
    /// Used directly by genesis initialization and recovery replay, where the height checks do not
    /// apply.
    fn execute_unchecked(
        &self,
        pipeline: &Pipeline<K>,
        block: &Block,
    ) -> Result<ExecuteResult, LedgerError> {
        let height = block.height();
        let context = BlockContext {
            height,
            block_hash: block.hash(),
            timestamp: block.header.timestamp,
        };

        let mut overlay: OverlayDB<K> = pipeline.state_store.new_overlay_db();
        let mut notifications = Vec::with_capacity(block.transactions.len());
        let mut cross_state_hashes = Vec::new();

        for transaction in &block.transactions {
            let output = self
                .executor
                .execute(&mut overlay, &context, transaction)
                .map_err(|source| LedgerError::Execution {
                    transaction: transaction.hash(),
                    source,
                })?;
            notifications.push((transaction.hash(), output.notifications));
            cross_state_hashes.extend(output.cross_state_hashes);
        }

        let cross_states_root = if cross_state_hashes.is_empty() {
            CryptoHash::empty()
        } else {
            proof::tree_root(&cross_state_hashes)
        };
        let change_hash = overlay.change_hash();
        let state_root = pipeline
            .state_store
            .get_state_merkle_root_with_new_hash(height, change_hash);

        self.publish(Event::ExecuteBlock(ExecuteBlockEvent {
            timestamp: SystemTime::now(),
            height,
            block: block.hash(),
            state_root,
            cross_states_root,
        }));

        Ok(ExecuteResult {
            state_root,
            cross_states_root,
            cross_state_hashes,
            change_hash,
            write_set: overlay.write_set(),
            notifications,
        })
    }

    /// Reconstructs the `ExecuteResult` of an already-committed height from the stores, with an
    /// empty write set. Performs no durable writes.
    fn replay_execute_result(
        &self,
        pipeline: &Pipeline<K>,
        height: BlockHeight,
    ) -> Result<ExecuteResult, LedgerError> {
        let (change_hash, state_root) = match pipeline.state_store.get_state_merkle_pair(height)? {
            Some(pair) => pair,
            None => (CryptoHash::empty(), CryptoHash::empty()),
        };
        Ok(ExecuteResult {
            state_root,
            cross_states_root: pipeline.state_store.get_cross_states_root(height)?,
            cross_state_hashes: pipeline
                .state_store
                .get_cross_states(height)?
                .unwrap_or_default(),
            change_hash,
            write_set: WriteSet::default(),
            notifications: Vec::new(),
        })
    }

    fn submit_block_locked(
        &self,
        pipeline: &mut Pipeline<K>,
        block: &Block,
        result: &ExecuteResult,
    ) -> Result<(), LedgerError> {
        let height = block.height();
        self.check_chain_id(block)?;
        let current = *self.current.read().expect(POISONED_LOCK);

        if let Some((current_height, _)) = current {
            if height <= current_height {
                log::info!("block {} already committed; submit is a no-op", height);
                return Ok(());
            }
        }
        let expected = match current {
            None => BlockHeight::new(0),
            Some((current_height, _)) => current_height + 1,
        };
        if height != expected {
            return Err(LedgerError::HeightMismatch {
                expected,
                got: height,
            });
        }

        let computed = pipeline
            .state_store
            .block_merkle_root_with_new_hashes(&[block.header.prev_block_hash]);
        if block.header.block_root != computed {
            return Err(LedgerError::BlockRootMismatch {
                height,
                declared: block.header.block_root,
                computed,
            });
        }

        self.save_block(pipeline, block, result, false)
    }

    /// The durable three-way commit: block-store batch, event-store batch, state-store batch, in
    /// that order. The event store commits before the state store so that a crash between the two
    /// leaves notifications re-derivable without double-counting on replay. Advances the current
    /// height only after all three commits, then publishes the completion event.
    fn save_block(
        &self,
        pipeline: &mut Pipeline<K>,
        block: &Block,
        result: &ExecuteResult,
        set_version: bool,
    ) -> Result<(), LedgerError> {
        let height = block.height();
        let hash = block.hash();

        let mut wb = BlockStoreWriteBatch::new();
        wb.set_block(block)?;
        wb.set_current_block(height, &hash)?;
        if set_version {
            wb.set_version(LEDGER_VERSION)?;
        }
        pipeline.block_store.write(wb);

        self.save_event_batch(pipeline, block, result)?;
        self.save_state_batch(pipeline, block, result)?;

        *self.current.write().expect(POISONED_LOCK) = Some((height, hash));
        self.push_header_index(pipeline, hash)?;

        self.publish(Event::CommitBlock(CommitBlockEvent {
            timestamp: SystemTime::now(),
            height,
            block: hash,
        }));
        Ok(())
    }

    /// Commits the event-store batch for a block whose block-store batch is already durable.
    fn save_event_batch(
        &self,
        pipeline: &mut Pipeline<K>,
        block: &Block,
        result: &ExecuteResult,
    ) -> Result<(), LedgerError> {
        let height = block.height();

        let mut wb = EventStoreWriteBatch::new();
        let mut notified_txs = Vec::new();
        for (tx_hash, notifications) in &result.notifications {
            if !notifications.is_empty() {
                wb.set_notify(tx_hash, notifications)?;
                notified_txs.push(*tx_hash);
            }
        }
        if !notified_txs.is_empty() {
            wb.set_txs_at_height(height, &notified_txs)?;
        }
        wb.set_current_height(height)?;
        pipeline.event_store.write(wb);

        Ok(())
    }

    /// Commits the state-store batch for a block whose block-store and event-store batches are
    /// already durable. Advancing the current-height record here, last, is what makes it the
    /// recovery low-water mark.
    fn save_state_batch(
        &self,
        pipeline: &mut Pipeline<K>,
        block: &Block,
        result: &ExecuteResult,
    ) -> Result<(), LedgerError> {
        let height = block.height();

        let mut wb = StateStoreWriteBatch::new();
        pipeline
            .state_store
            .add_block_merkle_tree_root(&mut wb, block.header.prev_block_hash)?;
        pipeline
            .state_store
            .add_state_merkle_tree_root(&mut wb, height, result.change_hash)?;
        pipeline.state_store.add_cross_states(
            &mut wb,
            height,
            &result.cross_state_hashes,
            result.cross_states_root,
        )?;
        pipeline
            .state_store
            .flush_write_set(&mut wb, &result.write_set);
        wb.set_current_height(height)?;
        pipeline.state_store.write(wb);

        Ok(())
    }

    /* ↓↓↓ Recovery ↓↓↓ */

    /// Replays every height whose block-store commit outlived its event- and state-store commits.
    ///
    /// The state store's current height is the low-water mark: batches commit block-then-event-
    /// then-state, so every height at or below it is fully committed in all three stores, and the
    /// event store can only be *ahead* of it. Replay re-executes each height above it (execution
    /// is deterministic, so this reproduces the lost batches exactly) and re-commits the event
    /// batch only where the event store is also behind, so an interrupted recovery never moves
    /// either store's height record backwards.
    fn recover(&self, pipeline: &mut Pipeline<K>) -> Result<(), LedgerError> {
        let block_height = match pipeline.block_store.current_block()? {
            None => return Ok(()),
            Some((height, _)) => height,
        };
        let state_height = pipeline.state_store.current_height()?;
        let event_height = pipeline.event_store.current_height()?;

        let mut next = match state_height {
            None => BlockHeight::new(0),
            Some(state) => state + 1,
        };
        if next <= block_height {
            log::info!(
                "recovering: state committed to {:?}, blocks committed to {}",
                state_height,
                block_height
            );
        }
        while next <= block_height {
            let block = pipeline.block_store.get_block_at_height(next)?.ok_or(
                LedgerError::BlockExpectedButNotFound { height: next },
            )?;
            let result = self.execute_unchecked(pipeline, &block)?;
            if event_height.map_or(true, |event| next > event) {
                self.save_event_batch(pipeline, &block, &result)?;
            }
            self.save_state_batch(pipeline, &block, &result)?;
            next += 1;
        }

        Ok(())
    }

    /* ↓↓↓ Header index ↓↓↓ */

    fn push_header_index(
        &self,
        pipeline: &mut Pipeline<K>,
        hash: CryptoHash,
    ) -> Result<(), LedgerError> {
        let mut header_index = self.header_index.lock().expect(POISONED_LOCK);
        header_index.push(hash);

        let batch_size = self.config.header_index_batch_size;
        while header_index.unflushed_count() >= batch_size {
            let (batch, hashes) = header_index.next_flush_batch(batch_size);
            let mut wb = BlockStoreWriteBatch::new();
            wb.set_header_index_batch(batch, hashes)?;
            pipeline.block_store.write(wb);
            header_index.mark_flushed(batch_size);

            self.publish(Event::FlushHeaderIndex(FlushHeaderIndexEvent {
                timestamp: SystemTime::now(),
                stored_count: header_index.stored_count(),
            }));
        }
        Ok(())
    }

    /* ↓↓↓ Read accessors ↓↓↓ */

    /// The height of the most recently committed block, or `None` before genesis initialization.
    pub fn current_block_height(&self) -> Option<BlockHeight> {
        self.current
            .read()
            .expect(POISONED_LOCK)
            .map(|(height, _)| height)
    }

    /// The hash of the most recently committed block, or `None` before genesis initialization.
    pub fn current_block_hash(&self) -> Option<CryptoHash> {
        self.current
            .read()
            .expect(POISONED_LOCK)
            .map(|(_, hash)| hash)
    }

    /// The committed block hash at `height`, answered from the in-memory header index.
    pub fn get_block_hash(&self, height: BlockHeight) -> Option<CryptoHash> {
        self.header_index.lock().expect(POISONED_LOCK).get(height)
    }

    pub fn get_block_by_hash(&self, hash: &CryptoHash) -> Result<Option<Block>, LedgerError> {
        Ok(self.lock_pipeline().block_store.get_block(hash)?)
    }

    pub fn get_block_by_height(&self, height: BlockHeight) -> Result<Option<Block>, LedgerError> {
        Ok(self.lock_pipeline().block_store.get_block_at_height(height)?)
    }

    /// The state-merkle root committed at `height`.
    pub fn get_state_merkle_root(&self, height: BlockHeight) -> Result<CryptoHash, LedgerError> {
        Ok(self.lock_pipeline().state_store.get_state_merkle_root(height)?)
    }

    /// The cross-states root committed at `height`; the empty hash if that block emitted no
    /// cross-chain events.
    pub fn get_cross_states_root(&self, height: BlockHeight) -> Result<CryptoHash, LedgerError> {
        Ok(self.lock_pipeline().state_store.get_cross_states_root(height)?)
    }

    /// The raw cross-states leaf hashes committed at `height`.
    pub fn get_cross_states(
        &self,
        height: BlockHeight,
    ) -> Result<Option<Vec<CryptoHash>>, LedgerError> {
        Ok(self.lock_pipeline().state_store.get_cross_states(height)?)
    }

    /// A Merkle inclusion path proving that the committed value at `key` is covered by the
    /// cross-states root of `height`. Other chains verify bridge events against this.
    pub fn get_cross_states_proof(
        &self,
        height: BlockHeight,
        key: &[u8],
    ) -> Result<Vec<PathNode>, LedgerError> {
        Ok(self
            .lock_pipeline()
            .state_store
            .get_cross_states_proof(height, key)?)
    }

    /// What the block-history root would be after appending `hashes`, starting exactly at the
    /// accumulator's current size (`start_height` must equal it). Consensus uses this to compute
    /// the block root a proposal at a future height must declare.
    pub fn get_block_root_with_pre_block_hashes(
        &self,
        start_height: BlockHeight,
        hashes: &[CryptoHash],
    ) -> Result<CryptoHash, LedgerError> {
        let pipeline = self.lock_pipeline();
        let tree_size = pipeline.state_store.block_merkle_tree_size();
        if start_height.int() != tree_size.int() {
            return Err(LedgerError::HeightMismatch {
                expected: BlockHeight::new(tree_size.int()),
                got: start_height,
            });
        }
        Ok(pipeline.state_store.block_merkle_root_with_new_hashes(hashes))
    }

    /// The committed state value at `key`, if any.
    pub fn get_state_value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.lock_pipeline().state_store.get_state_value(key)
    }

    /// The notifications emitted while executing `transaction`.
    pub fn get_execute_notify(
        &self,
        transaction: &CryptoHash,
    ) -> Result<Option<Vec<Notification>>, LedgerError> {
        Ok(self.lock_pipeline().event_store.get_notify(transaction)?)
    }

    /// Hashes of the transactions that emitted notifications at `height`, or `None` if no
    /// transaction of that block did. Relayers walk this index and pull each transaction's
    /// notifications through [`get_execute_notify`](Self::get_execute_notify).
    pub fn get_notify_txs_at_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<Vec<CryptoHash>>, LedgerError> {
        Ok(self.lock_pipeline().event_store.get_txs_at_height(height)?)
    }

    /// The bookkeeper set persisted at genesis.
    pub fn get_bookkeepers(&self) -> Result<Option<Vec<PublicKeyBytes>>, LedgerError> {
        Ok(self.lock_pipeline().state_store.get_bookkeepers()?)
    }

    /* ↓↓↓ Internal plumbing ↓↓↓ */

    fn check_chain_id(&self, block: &Block) -> Result<(), LedgerError> {
        if block.header.chain_id != self.config.chain_id {
            return Err(LedgerError::ChainIDMismatch {
                expected: self.config.chain_id,
                got: block.header.chain_id,
            });
        }
        Ok(())
    }

    fn lock_pipeline(&self) -> std::sync::MutexGuard<'_, Pipeline<K>> {
        self.pipeline.lock().expect(POISONED_LOCK)
    }

    pub(crate) fn publish(&self, event: Event) {
        if let Some(event_publisher) = &self.event_publisher {
            event_publisher
                .lock()
                .expect(POISONED_LOCK)
                .send(event)
                .expect("event_bus thread disconnected from main thread")
        }
    }
}

const POISONED_LOCK: &str = "Programming error: a ledger lock was poisoned.";

/// The in-memory height-to-hash index.
///
/// Mappings are buffered in memory and flushed to the block store in fixed-size batches, trading a
/// bounded amount of replay-on-restart work for reduced write amplification. Invariant:
/// `stored_count <= current_height + 1`; the unflushed suffix is replayed from the block store's
/// per-height records on open.
struct HeaderIndex {
    hashes: Vec<CryptoHash>,
    stored_count: u64,
}

impl HeaderIndex {
    fn load<K: KVStore>(block_store: &BlockStore<K>) -> Result<HeaderIndex, KVGetError> {
        let mut hashes = Vec::new();
        let mut batch = 0u64;
        while let Some(mut stored) = block_store.get_header_index_batch(batch)? {
            hashes.append(&mut stored);
            batch += 1;
        }
        let stored_count = hashes.len() as u64;

        if let Some((current_height, _)) = block_store.current_block()? {
            let mut height = stored_count;
            while height <= current_height.int() {
                let hash = block_store
                    .get_block_hash_at_height(BlockHeight::new(height))?
                    .ok_or(KVGetError::ValueExpectedButNotFound {
                        key: Key::BlockHashAtHeight {
                            height: BlockHeight::new(height),
                        },
                    })?;
                hashes.push(hash);
                height += 1;
            }
        }

        Ok(HeaderIndex {
            hashes,
            stored_count,
        })
    }

    fn reset(&mut self) {
        self.hashes.clear();
        self.stored_count = 0;
    }

    fn get(&self, height: BlockHeight) -> Option<CryptoHash> {
        self.hashes.get(height.int() as usize).copied()
    }

    fn push(&mut self, hash: CryptoHash) {
        self.hashes.push(hash)
    }

    fn unflushed_count(&self) -> u64 {
        self.hashes.len() as u64 - self.stored_count
    }

    fn next_flush_batch(&self, batch_size: u64) -> (u64, &[CryptoHash]) {
        let start = self.stored_count as usize;
        let end = start + batch_size as usize;
        (self.stored_count / batch_size, &self.hashes[start..end])
    }

    fn mark_flushed(&mut self, batch_size: u64) {
        self.stored_count += batch_size
    }

    fn stored_count(&self) -> u64 {
        self.stored_count
    }
}

/// The ways the commitment pipeline can fail. Integrity violations
/// ([`BlockRootMismatch`](LedgerError::BlockRootMismatch),
/// [`StateRootMismatch`](LedgerError::StateRootMismatch),
/// [`GenesisMismatch`](LedgerError::GenesisMismatch), and
/// [`StateStore`](LedgerError::StateStore) size inconsistencies) are fatal for the offending
/// block and must not be silently continued past; height mismatches are recoverable and callers
/// decide whether to resynchronize.
#[derive(Debug)]
pub enum LedgerError {
    KVGet(KVGetError),

    KVSet(KVSetError),

    StateStore(StateStoreError),

    /// The transaction executor rejected a transaction, aborting the block's execution.
    Execution {
        transaction: CryptoHash,
        source: ExecutionError,
    },

    /// The block belongs to a different network than this ledger is configured for.
    ChainIDMismatch { expected: ChainID, got: ChainID },

    /// A block arrived out of order: executes and submits require exactly `current + 1`.
    HeightMismatch {
        expected: BlockHeight,
        got: BlockHeight,
    },

    /// The header's declared block root does not match the root derived from the block-history
    /// accumulator.
    BlockRootMismatch {
        height: BlockHeight,
        declared: CryptoHash,
        computed: CryptoHash,
    },

    /// The state root claimed for a synced block does not match the root its execution produced.
    StateRootMismatch {
        height: BlockHeight,
        claimed: CryptoHash,
        computed: CryptoHash,
    },

    /// The supplied genesis block does not match the chain already committed in the block store.
    GenesisMismatch {
        stored: CryptoHash,
        supplied: CryptoHash,
    },

    /// A block that an invariant says must exist in the block store was not found.
    BlockExpectedButNotFound { height: BlockHeight },
}

impl From<KVGetError> for LedgerError {
    fn from(value: KVGetError) -> Self {
        LedgerError::KVGet(value)
    }
}

impl From<KVSetError> for LedgerError {
    fn from(value: KVSetError) -> Self {
        LedgerError::KVSet(value)
    }
}

impl From<StateStoreError> for LedgerError {
    fn from(value: StateStoreError) -> Self {
        LedgerError::StateStore(value)
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::KVGet(error) => write!(f, "{}", error),
            LedgerError::KVSet(error) => write!(f, "{}", error),
            LedgerError::StateStore(error) => write!(f, "{}", error),
            LedgerError::Execution {
                transaction,
                source,
            } => write!(
                f,
                "execution failed: transaction: {:?}, error: {}",
                transaction, source
            ),
            LedgerError::ChainIDMismatch { expected, got } => write!(
                f,
                "chain id mismatch: expected {}, got {}",
                expected.int(),
                got.int()
            ),
            LedgerError::HeightMismatch { expected, got } => {
                write!(f, "height mismatch: expected {}, got {}", expected, got)
            }
            LedgerError::BlockRootMismatch {
                height,
                declared,
                computed,
            } => write!(
                f,
                "block root mismatch at height {}: declared {:?}, computed {:?}",
                height, declared, computed
            ),
            LedgerError::StateRootMismatch {
                height,
                claimed,
                computed,
            } => write!(
                f,
                "state root mismatch at height {}: claimed {:?}, computed {:?}",
                height, claimed, computed
            ),
            LedgerError::GenesisMismatch { stored, supplied } => write!(
                f,
                "genesis mismatch: stored {:?}, supplied {:?}",
                stored, supplied
            ),
            LedgerError::BlockExpectedButNotFound { height } => {
                write!(f, "block expected but not found at height {}", height)
            }
        }
    }
}

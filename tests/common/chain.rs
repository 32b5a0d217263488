//! Helpers for building valid chains of blocks and opening ledgers over [`MemDB`]s.

use std::sync::Arc;

use relay_ledger::{
    config::LedgerConfig,
    ledger::{LedgerSpec, LedgerStore},
    merkle::CompactMerkleTree,
    types::{
        basic::{BlockHeight, ChainID, CryptoHash},
        block::{Block, Header, Transaction},
    },
};

use crate::common::{executor::CounterExecutor, mem_db::MemDB};

pub(crate) const TEST_CHAIN_ID: ChainID = ChainID::new(7);

/// Builds consecutive valid blocks: correct heights, parent hashes, and block roots. Mirrors the
/// block-history accumulator so block roots can be computed without asking the ledger.
pub(crate) struct TestChain {
    tree: CompactMerkleTree,
    prev_hash: CryptoHash,
}

impl TestChain {
    pub(crate) fn new() -> TestChain {
        TestChain {
            tree: CompactMerkleTree::new(),
            prev_hash: CryptoHash::empty(),
        }
    }

    /// The next block of the chain, containing `transactions`. The first call returns the genesis
    /// block.
    pub(crate) fn next_block(&mut self, transactions: Vec<Transaction>) -> Block {
        let height = BlockHeight::new(self.tree.size().int());
        let header = Header {
            version: 0,
            chain_id: TEST_CHAIN_ID,
            height,
            prev_block_hash: self.prev_hash,
            transactions_root: Block::compute_transactions_root(&transactions),
            cross_states_root: CryptoHash::empty(),
            block_root: self.tree.root_with_new_leaves(&[self.prev_hash]),
            timestamp: 1_600_000_000 + height.int(),
            bookkeepers: Vec::new(),
            sig_data: Vec::new(),
        };
        let block = Block::new(header, transactions);
        self.tree.append(self.prev_hash);
        self.prev_hash = block.hash();
        block
    }
}

/// The three backing stores of a ledger, kept so tests can freeze them individually.
#[derive(Clone)]
pub(crate) struct TestStores {
    pub(crate) block_kv: MemDB,
    pub(crate) state_kv: MemDB,
    pub(crate) event_kv: MemDB,
}

impl TestStores {
    pub(crate) fn new() -> TestStores {
        TestStores {
            block_kv: MemDB::new(),
            state_kv: MemDB::new(),
            event_kv: MemDB::new(),
        }
    }
}

/// Opens a ledger with the [`CounterExecutor`] over `stores` and initializes it with
/// `genesis_block`.
pub(crate) fn open_ledger(
    stores: &TestStores,
    genesis_block: &Block,
    fork_height: BlockHeight,
) -> Arc<LedgerStore<MemDB, CounterExecutor>> {
    let config = LedgerConfig::builder()
        .chain_id(TEST_CHAIN_ID)
        .state_fork_height(fork_height)
        .log_events(true)
        .build();
    let ledger = LedgerSpec::builder()
        .block_kv(stores.block_kv.clone())
        .state_kv(stores.state_kv.clone())
        .event_kv(stores.event_kv.clone())
        .executor(CounterExecutor)
        .config(config)
        .build()
        .open()
        .unwrap();
    ledger.initialize(genesis_block, &[]).unwrap();
    Arc::new(ledger)
}

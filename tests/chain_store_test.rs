//! Exercises the chain store's deferred submission: a block is executed the moment it arrives but
//! only durably submitted once its successor does.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use log::LevelFilter;
use relay_ledger::{
    config::LedgerConfig,
    ledger::{ChainStore, LedgerError, LedgerSpec},
    types::basic::{BlockHeight, CryptoHash},
};

mod common;

use crate::common::{
    chain::{open_ledger, TestChain, TestStores, TEST_CHAIN_ID},
    executor::{counter_value, CounterExecutor, CounterTransaction, COUNTER_KEY},
    logging::setup_logger,
};

#[test]
fn deferred_submission_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Initialize a ledger and front it with a chain store.
    let mut chain = TestChain::new();
    let genesis_block = chain.next_block(Vec::new());
    let stores = TestStores::new();
    let ledger = open_ledger(&stores, &genesis_block, BlockHeight::new(0));
    let chain_store = ChainStore::open(ledger.clone());

    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(0)));

    // 2. Block 1 arrives: executed and cached, but not yet submitted.
    let block_1 = chain.next_block(vec![CounterTransaction::Add(4).to_transaction(0)]);
    chain_store.add_block(&block_1).unwrap();

    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(1)));
    assert_eq!(ledger.current_block_height(), Some(BlockHeight::new(0)));
    assert_eq!(counter_value(ledger.get_state_value(&COUNTER_KEY)), 0);

    // 2.1. The pending result is readable before it is durable.
    let pending_root = chain_store.get_exec_merkle_root(BlockHeight::new(1)).unwrap();
    assert!(chain_store.get_exec_write_set(BlockHeight::new(1)).is_some());
    assert_eq!(
        chain_store.get_pending_block(BlockHeight::new(1)).unwrap().hash(),
        block_1.hash()
    );

    // 3. Block 2 arrives: block 1 gets submitted, block 2 becomes the pending tip.
    let block_2 = chain.next_block(vec![CounterTransaction::Add(6).to_transaction(1)]);
    chain_store.add_block(&block_2).unwrap();

    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(2)));
    assert_eq!(ledger.current_block_height(), Some(BlockHeight::new(1)));
    assert_eq!(counter_value(ledger.get_state_value(&COUNTER_KEY)), 4);

    // 3.1. The committed root agrees with what the pending cache reported, and the accessor now
    // answers from the ledger.
    assert_eq!(
        ledger.get_state_merkle_root(BlockHeight::new(1)).unwrap(),
        pending_root
    );
    assert_eq!(
        chain_store.get_exec_merkle_root(BlockHeight::new(1)).unwrap(),
        pending_root
    );

    // 3.2. Committed write sets are no longer cached; the pending tip's still is.
    assert!(chain_store.get_exec_write_set(BlockHeight::new(1)).is_none());
    assert!(chain_store.get_exec_write_set(BlockHeight::new(2)).is_some());

    // 4. Duplicate and out-of-order arrivals are handled.
    chain_store.add_block(&block_1).unwrap();
    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(2)));
    let block_3 = chain.next_block(vec![CounterTransaction::CrossPut {
        key: b"bridged".to_vec(),
        value: b"payload".to_vec(),
    }
    .to_transaction(2)]);
    let block_4 = chain.next_block(Vec::new());
    assert!(chain_store.add_block(&block_4).is_err());
    chain_store.add_block(&block_3).unwrap();

    // 4.1. Block 3's cross-states root is readable from the pending cache before it is durable.
    let pending_cross_root = chain_store
        .get_cross_states_root(BlockHeight::new(3))
        .unwrap();
    assert_ne!(pending_cross_root, CryptoHash::empty());

    chain_store.add_block(&block_4).unwrap();

    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(4)));
    assert_eq!(ledger.current_block_height(), Some(BlockHeight::new(3)));
    assert_eq!(counter_value(ledger.get_state_value(&COUNTER_KEY)), 10);

    // 4.2. Once block 3 is committed, the accessor answers the same root from the ledger.
    assert_eq!(
        chain_store
            .get_cross_states_root(BlockHeight::new(3))
            .unwrap(),
        pending_cross_root
    );
    assert_eq!(
        ledger.get_cross_states_root(BlockHeight::new(3)).unwrap(),
        pending_cross_root
    );

    // 5. After reloading from the ledger, the pending tip survives and committed heights are
    // dropped from the cache.
    chain_store.reload_from_ledger();
    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(4)));
    assert!(chain_store.get_pending_block(BlockHeight::new(4)).is_some());
    assert!(chain_store.get_pending_block(BlockHeight::new(3)).is_none());
}

#[test]
fn deferred_submission_failure_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Initialize a ledger with a handler recording every submit failure.
    let mut chain = TestChain::new();
    let genesis_block = chain.next_block(Vec::new());
    let stores = TestStores::new();

    let failures: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let failures_in_handler = failures.clone();
    let config = LedgerConfig::builder()
        .chain_id(TEST_CHAIN_ID)
        .state_fork_height(BlockHeight::new(0))
        .build();
    let ledger = LedgerSpec::builder()
        .block_kv(stores.block_kv.clone())
        .state_kv(stores.state_kv.clone())
        .event_kv(stores.event_kv.clone())
        .executor(CounterExecutor)
        .config(config)
        .on_submit_failure(vec![Box::new(move |event| {
            failures_in_handler
                .lock()
                .unwrap()
                .push(event.height.int())
        })])
        .build()
        .open()
        .unwrap();
    ledger.initialize(&genesis_block, &[]).unwrap();
    let ledger = Arc::new(ledger);
    let chain_store = ChainStore::open(ledger.clone());

    // 2. Block 1 declares a bogus block root. Execution does not check it, so the block is cached
    // as the pending tip.
    let mut block_1 = chain.next_block(vec![CounterTransaction::Add(4).to_transaction(0)]);
    block_1.header.block_root = CryptoHash::new([99; 32]);
    chain_store.add_block(&block_1).unwrap();
    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(1)));

    // 3. Block 2 arrives: submission of block 1 fails on the root mismatch. The failure is
    // announced, the pending entry survives, and block 2's own execution fails against the
    // unadvanced ledger height.
    let block_2 = chain.next_block(Vec::new());
    assert!(matches!(
        chain_store.add_block(&block_2),
        Err(LedgerError::HeightMismatch { .. })
    ));
    assert_eq!(chain_store.chained_height(), Some(BlockHeight::new(1)));
    assert!(chain_store.get_pending_block(BlockHeight::new(1)).is_some());
    assert_eq!(ledger.current_block_height(), Some(BlockHeight::new(0)));

    while *failures.lock().unwrap() != vec![1] {
        thread::sleep(Duration::from_millis(10));
    }

    // 4. The next arrival retries the same submission, which fails the same way.
    assert!(chain_store.add_block(&block_2).is_err());
    while *failures.lock().unwrap() != vec![1, 1] {
        thread::sleep(Duration::from_millis(10));
    }
}

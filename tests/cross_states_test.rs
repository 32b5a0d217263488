//! Covers the cross-chain state commitments (roots, stored leaf lists, inclusion proofs) and the
//! fork-activation boundary of the delta-state tree.

use log::LevelFilter;
use relay_ledger::{
    merkle::proof,
    types::basic::{BlockHeight, CryptoHash},
    types::block::CryptoHasher,
};
use sha2::Digest;

mod common;

use crate::common::{
    chain::{open_ledger, TestChain, TestStores},
    executor::CounterTransaction,
    logging::setup_logger,
};

#[test]
fn cross_states_commitment_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Commit a block carrying two cross-chain state writes.
    let mut chain = TestChain::new();
    let genesis_block = chain.next_block(Vec::new());
    let stores = TestStores::new();
    let ledger = open_ledger(&stores, &genesis_block, BlockHeight::new(0));

    let block_1 = chain.next_block(vec![
        CounterTransaction::CrossPut {
            key: b"lock:btc".to_vec(),
            value: b"amount=3".to_vec(),
        }
        .to_transaction(0),
        CounterTransaction::CrossPut {
            key: b"lock:eth".to_vec(),
            value: b"amount=11".to_vec(),
        }
        .to_transaction(1),
    ]);
    let result_1 = ledger.execute_block(&block_1).unwrap();
    ledger.submit_block(&block_1, result_1.clone()).unwrap();

    // 2. The committed leaf list and root agree with the staged result and with a recomputation
    // from scratch.
    let leaves = ledger
        .get_cross_states(BlockHeight::new(1))
        .unwrap()
        .unwrap();
    assert_eq!(
        leaves,
        vec![
            CryptoHash::new(CryptoHasher::digest(b"amount=3").into()),
            CryptoHash::new(CryptoHasher::digest(b"amount=11").into()),
        ]
    );
    let root = ledger.get_cross_states_root(BlockHeight::new(1)).unwrap();
    assert_eq!(root, result_1.cross_states_root);
    assert_eq!(root, proof::tree_root(&leaves));

    // 3. Inclusion proofs over the committed values verify against the root.
    for (key, value) in [
        (b"lock:btc".as_slice(), b"amount=3".as_slice()),
        (b"lock:eth".as_slice(), b"amount=11".as_slice()),
    ] {
        let path = ledger
            .get_cross_states_proof(BlockHeight::new(1), key)
            .unwrap();
        let leaf = CryptoHash::new(CryptoHasher::digest(value).into());
        assert!(proof::verify(leaf, &path, root));
    }

    // 4. A proof for a key that was never committed as a cross state is refused.
    assert!(ledger
        .get_cross_states_proof(BlockHeight::new(1), b"lock:doge")
        .is_err());

    // 5. A block with no cross-chain writes commits no leaf list and the empty root.
    let block_2 = chain.next_block(vec![CounterTransaction::Add(1).to_transaction(2)]);
    let result_2 = ledger.execute_block(&block_2).unwrap();
    assert_eq!(result_2.cross_states_root, CryptoHash::empty());
    ledger.submit_block(&block_2, result_2).unwrap();
    assert!(ledger.get_cross_states(BlockHeight::new(2)).unwrap().is_none());
    assert_eq!(
        ledger.get_cross_states_root(BlockHeight::new(2)).unwrap(),
        CryptoHash::empty()
    );
}

#[test]
fn state_fork_activation_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Open a ledger whose delta-state tree only activates at height 2, and commit past the
    // boundary.
    let mut chain = TestChain::new();
    let genesis_block = chain.next_block(Vec::new());
    let stores = TestStores::new();
    let ledger = open_ledger(&stores, &genesis_block, BlockHeight::new(2));

    let mut results = Vec::new();
    for nonce in 0..3 {
        let block = chain.next_block(vec![CounterTransaction::Add(1).to_transaction(nonce)]);
        let result = ledger.execute_block(&block).unwrap();
        results.push(result.clone());
        ledger.submit_block(&block, result).unwrap();
    }

    // 2. Heights below the fork have no state-merkle root.
    assert_eq!(results[0].state_root, CryptoHash::empty());
    assert_eq!(
        ledger.get_state_merkle_root(BlockHeight::new(1)).unwrap(),
        CryptoHash::empty()
    );

    // 3. At the fork height the tree restarts: its root is that block's change hash alone.
    assert_eq!(results[1].state_root, results[1].change_hash);
    assert_eq!(
        ledger.get_state_merkle_root(BlockHeight::new(2)).unwrap(),
        results[1].state_root
    );

    // 4. Past the fork the tree accumulates and the root moves.
    assert_ne!(results[2].state_root, results[2].change_hash);
    assert_eq!(
        ledger.get_state_merkle_root(BlockHeight::new(3)).unwrap(),
        results[2].state_root
    );

    // 5. The accumulated sizes survive a reopen (a size mismatch would fail the open).
    drop(ledger);
    let reopened = open_ledger(&stores, &genesis_block, BlockHeight::new(2));
    assert_eq!(reopened.current_block_height(), Some(BlockHeight::new(3)));
    assert_eq!(
        reopened.get_state_merkle_root(BlockHeight::new(3)).unwrap(),
        results[2].state_root
    );
}

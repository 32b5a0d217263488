//! A simple, volatile, in-memory implementation of [`KVStore`].

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use relay_ledger::state::{KVGet, KVStore, WriteBatch};

/// An in-memory implementation of [`KVStore`].
///
/// `MemDB` can be "frozen": a frozen store silently discards writes while continuing to serve
/// reads. Crash-recovery tests freeze a store mid-pipeline to simulate a crash that durably
/// committed some of a block's batches but not others.
#[derive(Clone)]
pub(crate) struct MemDB(Arc<MemDBInner>);

struct MemDBInner {
    map: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    frozen: AtomicBool,
}

impl MemDB {
    /// Create a new, empty `MemDB`.
    pub(crate) fn new() -> MemDB {
        MemDB(Arc::new(MemDBInner {
            map: Mutex::new(BTreeMap::new()),
            frozen: AtomicBool::new(false),
        }))
    }

    /// Start (or stop) discarding writes. Affects every clone of this store.
    pub(crate) fn set_frozen(&self, frozen: bool) {
        self.0.frozen.store(frozen, Ordering::SeqCst)
    }
}

impl KVStore for MemDB {
    type WriteBatch = MemWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) {
        if self.0.frozen.load(Ordering::SeqCst) {
            return;
        }
        let mut map = self.0.map.lock().unwrap();
        for (key, value) in wb.ops {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
}

impl KVGet for MemDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.map.lock().unwrap().get(key).cloned()
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.0
            .map
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// A simple implementation of [`WriteBatch`]. `None` marks a deletion. Later mutations of a key
/// overwrite earlier ones, preserving batch order.
pub(crate) struct MemWriteBatch {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBatch for MemWriteBatch {
    fn new() -> Self {
        MemWriteBatch {
            ops: BTreeMap::new(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.ops.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.insert(key.to_vec(), None);
    }
}

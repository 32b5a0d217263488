/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable persistence of per-transaction execution notifications, indexed by transaction hash and
//! by height.
//!
//! Every record is a keyed put, so re-applying a height during restart recovery overwrites the
//! same keys instead of double-counting.

use borsh::{BorshDeserialize, BorshSerialize};

use super::kv_store::{KVGetError, KVSetError, KVStore, Key, WriteBatch};
use super::paths;
use super::utilities::combine;
use crate::types::basic::{BlockHeight, CryptoHash, Notification};

pub struct EventStore<K: KVStore> {
    store: K,
}

impl<K: KVStore> EventStore<K> {
    pub fn new(store: K) -> EventStore<K> {
        EventStore { store }
    }

    /// The notifications emitted while executing `transaction`, or `None` if the transaction is
    /// unknown or emitted none.
    pub fn get_notify(
        &self,
        transaction: &CryptoHash,
    ) -> Result<Option<Vec<Notification>>, KVGetError> {
        let key = combine(&paths::EVENT_NOTIFY, &transaction.bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(
                Vec::<Notification>::deserialize(&mut &*bytes).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::EventNotify {
                            transaction: *transaction,
                        },
                        source: err,
                    }
                })?,
            ))
        } else {
            Ok(None)
        }
    }

    /// Hashes of the transactions that emitted notifications at `height`.
    pub fn get_txs_at_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<Vec<CryptoHash>>, KVGetError> {
        let key = combine(&paths::EVENT_TXS_AT_HEIGHT, &height.to_le_bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(Vec::<CryptoHash>::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::EventTxsAtHeight { height },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    /// The height whose event batch was most recently committed, or `None` before genesis.
    pub fn current_height(&self) -> Result<Option<BlockHeight>, KVGetError> {
        if let Some(bytes) = self.store.get(&paths::CURRENT_EVENT_HEIGHT) {
            Ok(Some(BlockHeight::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::CurrentEventHeight,
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    /// Atomically applies `wb`.
    pub fn write(&mut self, wb: EventStoreWriteBatch<K::WriteBatch>) {
        self.store.write(wb.0)
    }

    /// Deletes everything in the event store. Used only during genesis (re-)initialization.
    pub fn clear_all(&mut self) {
        let mut wb = K::WriteBatch::new();
        for key in self.store.keys_with_prefix(&[]) {
            wb.delete(&key);
        }
        self.store.write(wb);
    }
}

/// A typed write batch over the event store's variables.
pub struct EventStoreWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> EventStoreWriteBatch<W> {
    pub fn new() -> EventStoreWriteBatch<W> {
        EventStoreWriteBatch(W::new())
    }

    pub fn set_notify(
        &mut self,
        transaction: &CryptoHash,
        notifications: &[Notification],
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &combine(&paths::EVENT_NOTIFY, &transaction.bytes()),
            &notifications
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::EventNotify {
                        transaction: *transaction,
                    },
                    source: err,
                })?,
        ))
    }

    pub fn set_txs_at_height(
        &mut self,
        height: BlockHeight,
        transactions: &[CryptoHash],
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &combine(&paths::EVENT_TXS_AT_HEIGHT, &height.to_le_bytes()),
            &transactions
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::EventTxsAtHeight { height },
                    source: err,
                })?,
        ))
    }

    pub fn set_current_height(&mut self, height: BlockHeight) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &paths::CURRENT_EVENT_HEIGHT,
            &height
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::CurrentEventHeight,
                    source: err,
                })?,
        ))
    }
}

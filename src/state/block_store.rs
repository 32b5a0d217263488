/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable persistence of blocks: headers, bodies, the height-to-hash index, the current-block
//! record, and the version marker written at genesis.

use borsh::{BorshDeserialize, BorshSerialize};

use super::kv_store::{KVGetError, KVSetError, KVStore, Key, WriteBatch};
use super::paths;
use super::utilities::combine;
use crate::types::basic::{BlockHeight, CryptoHash};
use crate::types::block::{Block, Header, Transaction};

pub struct BlockStore<K: KVStore> {
    store: K,
}

impl<K: KVStore> BlockStore<K> {
    pub fn new(store: K) -> BlockStore<K> {
        BlockStore { store }
    }

    pub fn get_header(&self, block: &CryptoHash) -> Result<Option<Header>, KVGetError> {
        let key = combine(&paths::BLOCK_HEADER, &block.bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(Header::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::BlockHeader { block: *block },
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    pub fn get_body(&self, block: &CryptoHash) -> Result<Option<Vec<Transaction>>, KVGetError> {
        let key = combine(&paths::BLOCK_BODY, &block.bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(Vec::<Transaction>::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::BlockBody { block: *block },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    pub fn get_block(&self, block: &CryptoHash) -> Result<Option<Block>, KVGetError> {
        let header = match self.get_header(block)? {
            None => return Ok(None),
            Some(header) => header,
        };
        // Safety: a header is only ever committed together with its body.
        let transactions =
            self.get_body(block)?
                .ok_or(KVGetError::ValueExpectedButNotFound {
                    key: Key::BlockBody { block: *block },
                })?;
        Ok(Some(Block::new(header, transactions)))
    }

    pub fn get_block_hash_at_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<CryptoHash>, KVGetError> {
        let key = combine(&paths::BLOCK_HASH_AT_HEIGHT, &height.to_le_bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(CryptoHash::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::BlockHashAtHeight { height },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    pub fn get_block_at_height(&self, height: BlockHeight) -> Result<Option<Block>, KVGetError> {
        match self.get_block_hash_at_height(height)? {
            None => Ok(None),
            Some(hash) => self.get_block(&hash),
        }
    }

    /// The height and hash of the most recently committed block, or `None` before genesis.
    pub fn current_block(&self) -> Result<Option<(BlockHeight, CryptoHash)>, KVGetError> {
        if let Some(bytes) = self.store.get(&paths::CURRENT_BLOCK) {
            Ok(Some(
                <(BlockHeight, CryptoHash)>::deserialize(&mut &*bytes).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::CurrentBlock,
                        source: err,
                    }
                })?,
            ))
        } else {
            Ok(None)
        }
    }

    pub fn version(&self) -> Result<Option<u32>, KVGetError> {
        if let Some(bytes) = self.store.get(&paths::VERSION_MARKER) {
            Ok(Some(u32::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::VersionMarker,
                    source: err,
                }
            })?))
        } else {
            Ok(None)
        }
    }

    pub fn get_header_index_batch(
        &self,
        batch: u64,
    ) -> Result<Option<Vec<CryptoHash>>, KVGetError> {
        let key = combine(&paths::HEADER_INDEX_BATCH, &batch.to_le_bytes());
        if let Some(bytes) = self.store.get(&key) {
            Ok(Some(Vec::<CryptoHash>::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::HeaderIndexBatch { batch },
                    source: err,
                },
            )?))
        } else {
            Ok(None)
        }
    }

    /// Atomically applies `wb`.
    pub fn write(&mut self, wb: BlockStoreWriteBatch<K::WriteBatch>) {
        self.store.write(wb.0)
    }

    /// Deletes everything in the block store. Used only during genesis (re-)initialization.
    pub fn clear_all(&mut self) {
        let mut wb = K::WriteBatch::new();
        for key in self.store.keys_with_prefix(&[]) {
            wb.delete(&key);
        }
        self.store.write(wb);
    }
}

/// A typed write batch over the block store's variables.
pub struct BlockStoreWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> BlockStoreWriteBatch<W> {
    pub fn new() -> BlockStoreWriteBatch<W> {
        BlockStoreWriteBatch(W::new())
    }

    /// Stages the block's header, body, and height-index entry.
    pub fn set_block(&mut self, block: &Block) -> Result<(), KVSetError> {
        let hash = block.hash();

        self.0.set(
            &combine(&paths::BLOCK_HEADER, &hash.bytes()),
            &block.header.try_to_vec().map_err(|err| {
                KVSetError::SerializeValueError {
                    key: Key::BlockHeader { block: hash },
                    source: err,
                }
            })?,
        );
        self.0.set(
            &combine(&paths::BLOCK_BODY, &hash.bytes()),
            &block.transactions.try_to_vec().map_err(|err| {
                KVSetError::SerializeValueError {
                    key: Key::BlockBody { block: hash },
                    source: err,
                }
            })?,
        );
        self.0.set(
            &combine(&paths::BLOCK_HASH_AT_HEIGHT, &block.height().to_le_bytes()),
            &hash.try_to_vec().map_err(|err| KVSetError::SerializeValueError {
                key: Key::BlockHashAtHeight {
                    height: block.height(),
                },
                source: err,
            })?,
        );

        Ok(())
    }

    pub fn set_current_block(
        &mut self,
        height: BlockHeight,
        hash: &CryptoHash,
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &paths::CURRENT_BLOCK,
            &(height, *hash)
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::CurrentBlock,
                    source: err,
                })?,
        ))
    }

    pub fn set_version(&mut self, version: u32) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &paths::VERSION_MARKER,
            &version
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::VersionMarker,
                    source: err,
                })?,
        ))
    }

    pub fn set_header_index_batch(
        &mut self,
        batch: u64,
        hashes: &[CryptoHash],
    ) -> Result<(), KVSetError> {
        Ok(self.0.set(
            &combine(&paths::HEADER_INDEX_BATCH, &batch.to_le_bytes()),
            &hashes
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::HeaderIndexBatch { batch },
                    source: err,
                })?,
        ))
    }
}

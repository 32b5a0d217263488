/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types used throughout the ledger: types that are sent around and inspected, but have no
//! active behavior. These types follow the newtype pattern and the API for using them is defined in
//! this module.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, Sub},
    slice, vec,
};

/// Id of the relay chain, used to distinguish networks (mainnet, testnets, devnets).
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Height of a block in the chain. The genesis block has height 0.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for BlockHeight {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;
    fn add(self, rhs: u64) -> Self::Output {
        BlockHeight::new(self.0.add(rhs))
    }
}

impl Sub<BlockHeight> for BlockHeight {
    type Output = u64;
    fn sub(self, rhs: BlockHeight) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Number of leaves held by a [Merkle accumulator](crate::merkle::CompactMerkleTree).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, BorshDeserialize, BorshSerialize)]
pub struct TreeSize(u64);

impl TreeSize {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for TreeSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// A SHA-256 digest. Block hashes, transaction hashes, Merkle roots, and write-set change hashes
/// are all `CryptoHash`es.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The hash reported for variables that do not have a meaningful value, e.g., the cross-states
    /// root of a block whose transactions emitted no cross-chain events.
    pub const fn empty() -> Self {
        Self([0u8; 32])
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for CryptoHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Arbitrary payload bytes: the body of a transaction, or the states carried by an execution
/// notification.
#[derive(Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize, Default)]
pub struct Datum(Vec<u8>);

impl Datum {
    pub fn new(bytes: Vec<u8>) -> Datum {
        Datum(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// An ordered list of [`Datum`]s.
#[derive(Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize, Default)]
pub struct Data(Vec<Datum>);

impl Data {
    pub fn new(data: Vec<Datum>) -> Data {
        Data(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Datum> {
        self.0.iter()
    }
}

/// An Ed25519 public key identifying a bookkeeper or addressing a native contract, in its
/// serialized form.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct PublicKeyBytes([u8; 32]);

impl PublicKeyBytes {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// An Ed25519 signature produced by a bookkeeper over a block header, in its serialized form.
#[derive(Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes(Vec<u8>);

impl SignatureBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A single key-value mutation produced by executing a block. `value == None` deletes the key.
#[derive(Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct WriteOp {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// The ordered set of key-value mutations produced by executing one block's transactions against
/// an [overlay](crate::state::overlay::OverlayDB). Keys are unique and sorted ascending, which
/// makes the write set's [change hash](crate::state::overlay::OverlayDB::change_hash)
/// deterministic.
#[derive(Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize, Default)]
pub struct WriteSet(Vec<WriteOp>);

impl WriteSet {
    pub fn new(ops: Vec<WriteOp>) -> WriteSet {
        WriteSet(ops)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, WriteOp> {
        self.0.iter()
    }
}

impl IntoIterator for WriteSet {
    type Item = WriteOp;
    type IntoIter = vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A notification emitted by a native contract while executing one transaction, e.g., "lock of N
/// tokens observed for chain C". Persisted in the event store keyed by the transaction's hash.
#[derive(Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Notification {
    /// Address of the native contract that emitted the notification.
    pub contract: PublicKeyBytes,
    /// Contract-defined notification payload.
    pub states: Data,
}

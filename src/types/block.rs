/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the block, header, and transaction types and their associated methods.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;

use crate::types::basic::*;

/// The header of a [`Block`]. Immutable once hashed.
///
/// `block_root` is the root of the block-history Merkle accumulator after this block's
/// `prev_block_hash` is appended to it; the commitment pipeline recomputes and verifies it before
/// durably committing the block.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Header {
    pub version: u32,
    pub chain_id: ChainID,
    pub height: BlockHeight,
    pub prev_block_hash: CryptoHash,
    pub transactions_root: CryptoHash,
    pub cross_states_root: CryptoHash,
    pub block_root: CryptoHash,
    pub timestamp: u64,
    /// Bookkeepers whose signatures are expected on this header.
    pub bookkeepers: Vec<PublicKeyBytes>,
    /// Signatures over [`Header::hash`], one per bookkeeper.
    pub sig_data: Vec<SignatureBytes>,
}

impl Header {
    /// Hash over every header field except the signatures, so that signing cannot change the value
    /// being signed.
    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&self.version.try_to_vec().unwrap());
        hasher.update(&self.chain_id.try_to_vec().unwrap());
        hasher.update(&self.height.try_to_vec().unwrap());
        hasher.update(&self.prev_block_hash.try_to_vec().unwrap());
        hasher.update(&self.transactions_root.try_to_vec().unwrap());
        hasher.update(&self.cross_states_root.try_to_vec().unwrap());
        hasher.update(&self.block_root.try_to_vec().unwrap());
        hasher.update(&self.timestamp.try_to_vec().unwrap());
        hasher.update(&self.bookkeepers.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Checks that every signature in `sig_data` is a correct signature over this header's hash by
    /// a key in `bookkeepers`.
    pub fn is_correct(&self, bookkeepers: &[PublicKeyBytes]) -> bool {
        if self.sig_data.len() > self.bookkeepers.len() {
            return false;
        }
        let msg = self.hash().bytes();
        self.sig_data.iter().zip(self.bookkeepers.iter()).all(|(sig, pk)| {
            if !bookkeepers.contains(pk) {
                return false;
            }
            let Ok(verifying_key) = VerifyingKey::from_bytes(&pk.bytes()) else {
                return false;
            };
            let Ok(signature) = Signature::from_slice(sig.bytes()) else {
                return false;
            };
            verifying_key.verify(&msg, &signature).is_ok()
        })
    }
}

/// A block: a header plus the ordered list of transactions it contains.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Block {
        Block {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> CryptoHash {
        self.header.hash()
    }

    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    /// Root of a full Merkle tree over the hashes of `transactions`. Empty hash for an empty
    /// block.
    pub fn compute_transactions_root(transactions: &[Transaction]) -> CryptoHash {
        if transactions.is_empty() {
            return CryptoHash::empty();
        }
        let leaves: Vec<CryptoHash> = transactions.iter().map(|tx| tx.hash()).collect();
        crate::merkle::proof::tree_root(&leaves)
    }
}

/// A transaction: an opaque payload interpreted by the
/// [transaction executor](crate::executor::TransactionExecutor), plus a nonce making its hash
/// unique.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub payload: Data,
}

impl Transaction {
    pub fn new(nonce: u64, payload: Data) -> Transaction {
        Transaction { nonce, payload }
    }

    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand_core::OsRng;

    fn test_header(bookkeepers: Vec<PublicKeyBytes>) -> Header {
        Header {
            version: 0,
            chain_id: ChainID::new(0),
            height: BlockHeight::new(1),
            prev_block_hash: CryptoHash::empty(),
            transactions_root: CryptoHash::empty(),
            cross_states_root: CryptoHash::empty(),
            block_root: CryptoHash::empty(),
            timestamp: 1_600_000_000,
            bookkeepers,
            sig_data: Vec::new(),
        }
    }

    #[test]
    fn correctly_signed_header_verifies() {
        let mut csprg = OsRng {};
        let keypair = SigningKey::generate(&mut csprg);
        let bookkeeper = PublicKeyBytes::new(keypair.verifying_key().to_bytes());

        let mut header = test_header(vec![bookkeeper]);
        let signature = keypair.sign(&header.hash().bytes());
        header.sig_data = vec![SignatureBytes::new(signature.to_vec())];

        assert!(header.is_correct(&[bookkeeper]));
    }

    #[test]
    fn signature_by_an_unknown_key_is_rejected() {
        let mut csprg = OsRng {};
        let keypair = SigningKey::generate(&mut csprg);
        let intruder = SigningKey::generate(&mut csprg);
        let bookkeeper = PublicKeyBytes::new(keypair.verifying_key().to_bytes());
        let intruder_key = PublicKeyBytes::new(intruder.verifying_key().to_bytes());

        let mut header = test_header(vec![intruder_key]);
        let signature = intruder.sign(&header.hash().bytes());
        header.sig_data = vec![SignatureBytes::new(signature.to_vec())];

        // The signature is internally consistent, but its key is not in the trusted set.
        assert!(!header.is_correct(&[bookkeeper]));
    }

    #[test]
    fn tampered_header_does_not_verify() {
        let mut csprg = OsRng {};
        let keypair = SigningKey::generate(&mut csprg);
        let bookkeeper = PublicKeyBytes::new(keypair.verifying_key().to_bytes());

        let mut header = test_header(vec![bookkeeper]);
        let signature = keypair.sign(&header.hash().bytes());
        header.sig_data = vec![SignatureBytes::new(signature.to_vec())];
        header.height = BlockHeight::new(2);

        assert!(!header.is_correct(&[bookkeeper]));
    }
}

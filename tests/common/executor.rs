//! [`CounterExecutor`], a simple implementation of [`TransactionExecutor`] used in all of the
//! integration tests.

use borsh::{BorshDeserialize, BorshSerialize};
use relay_ledger::{
    executor::{BlockContext, ExecutionError, TransactionExecutor, TransactionOutput},
    state::{KVStore, OverlayDB},
    types::{
        basic::{CryptoHash, Data, Datum, Notification, PublicKeyBytes},
        block::{CryptoHasher, Transaction},
    },
};
use sha2::Digest;

/// A deterministic implementation of [`TransactionExecutor`] for use in integration tests.
///
/// The counter executor maintains a state consisting of a single number under [`COUNTER_KEY`],
/// which [`Add`](CounterTransaction::Add) transactions increase, plus arbitrary key-value pairs
/// written by [`Put`](CounterTransaction::Put) and [`CrossPut`](CounterTransaction::CrossPut)
/// transactions. `CrossPut` additionally emits the Sha256 digest of the written value as a
/// cross-chain Merkle leaf, the way bridge contracts do.
pub(crate) struct CounterExecutor;

/// Instructions that the counter executor interprets from a [`Transaction`]'s payload.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub(crate) enum CounterTransaction {
    /// Increase the number in the state by the given amount.
    Add(u64),

    /// Write an arbitrary key-value pair into the state.
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Write a key-value pair into the state and emit its value hash as a cross-chain leaf.
    CrossPut { key: Vec<u8>, value: Vec<u8> },

    /// Emit an execution notification attributed to the given contract.
    Notify { contract: PublicKeyBytes, states: Vec<Vec<u8>> },

    /// Fail with a contract error.
    Fail { reason: String },
}

impl CounterTransaction {
    /// Wrap this instruction into a [`Transaction`] with the given nonce.
    pub(crate) fn to_transaction(&self, nonce: u64) -> Transaction {
        let payload = Data::new(vec![Datum::new(self.try_to_vec().unwrap())]);
        Transaction::new(nonce, payload)
    }
}

// The key in the state where the counter is stored.
pub(crate) const COUNTER_KEY: [u8; 1] = [0];

/// Read the counter out of a committed-state read function.
pub(crate) fn counter_value(state_value: Option<Vec<u8>>) -> u64 {
    state_value
        .map(|bytes| u64::from_le_bytes(bytes.try_into().unwrap()))
        .unwrap_or(0)
}

impl<K: KVStore> TransactionExecutor<K> for CounterExecutor {
    fn execute(
        &self,
        overlay: &mut OverlayDB<K>,
        _context: &BlockContext,
        transaction: &Transaction,
    ) -> Result<TransactionOutput, ExecutionError> {
        let instruction = transaction
            .payload
            .iter()
            .next()
            .and_then(|datum| CounterTransaction::deserialize(&mut datum.bytes()).ok())
            .ok_or(ExecutionError::InvalidPayload)?;

        let mut output = TransactionOutput {
            notifications: Vec::new(),
            cross_state_hashes: Vec::new(),
        };
        match instruction {
            CounterTransaction::Add(amount) => {
                let number = counter_value(overlay.get(&COUNTER_KEY));
                overlay.put(COUNTER_KEY.to_vec(), (number + amount).to_le_bytes().to_vec());
            }
            CounterTransaction::Put { key, value } => {
                overlay.put(key, value);
            }
            CounterTransaction::CrossPut { key, value } => {
                let leaf = CryptoHash::new(CryptoHasher::digest(&value).into());
                overlay.put(key, value);
                output.cross_state_hashes.push(leaf);
            }
            CounterTransaction::Notify { contract, states } => {
                output.notifications.push(Notification {
                    contract,
                    states: Data::new(states.into_iter().map(Datum::new).collect()),
                });
            }
            CounterTransaction::Fail { reason } => {
                return Err(ExecutionError::ContractFailure { reason });
            }
        }
        Ok(output)
    }
}

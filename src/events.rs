//! Definitions of ledger events for event handling and logging.
//! Note: an event for a given action indicates that the action has been completed (or, for
//! [`SubmitFailureEvent`], that it failed).

use std::time::SystemTime;

use crate::types::basic::{BlockHeight, CryptoHash};

pub enum Event {
    // Events that change persistent state.
    CommitBlock(CommitBlockEvent),
    FlushHeaderIndex(FlushHeaderIndexEvent),
    // Events of the staging phase.
    ExecuteBlock(ExecuteBlockEvent),
    // Health signals.
    SubmitFailure(SubmitFailureEvent),
}

/// A block's transactions were executed and its roots staged. Nothing durable changed.
pub struct ExecuteBlockEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub block: CryptoHash,
    pub state_root: CryptoHash,
    pub cross_states_root: CryptoHash,
}

/// A block was durably committed across all three stores and the current height advanced.
pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub block: CryptoHash,
}

/// A batch of the in-memory header index was flushed to the block store.
pub struct FlushHeaderIndexEvent {
    pub timestamp: SystemTime,
    pub stored_count: u64,
}

/// A deferred submission attempted by the consensus-facing cache failed. The submission is retried
/// the next time a block arrives; persistent failures are worth alerting on.
pub struct SubmitFailureEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub reason: String,
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The ledger's static configuration, defined using the builder pattern:
//!
//! ```ignore
//! let config = LedgerConfig::builder()
//!     .chain_id(ChainID::new(0))
//!     .state_fork_height(BlockHeight::new(0))
//!     .log_events(true)
//!     .build();
//! ```

use typed_builder::TypedBuilder;

use crate::types::basic::{BlockHeight, ChainID};

#[derive(Clone, TypedBuilder)]
pub struct LedgerConfig {
    /// Id of the network this ledger belongs to.
    pub chain_id: ChainID,

    /// The height at which the delta-state Merkle tree activates (and resets). Heights below this
    /// have no state-merkle root. Networks launched after the state-root upgrade set this to 0.
    pub state_fork_height: BlockHeight,

    /// How many heights of the in-memory header index accumulate before being flushed to the
    /// block store in one batch. Bounds the replay work after a crash.
    #[builder(default = 2000)]
    pub header_index_batch_size: u64,

    /// Whether to register the default CSV logging handlers for ledger events.
    #[builder(default = false)]
    pub log_events: bool,
}

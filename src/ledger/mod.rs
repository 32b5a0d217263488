/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block commitment pipeline and the consensus-facing pending-block cache.

pub mod ledger_store;
pub use ledger_store::{ExecuteResult, LedgerError, LedgerSpec, LedgerStore};

pub mod chain_store;
pub use chain_store::ChainStore;

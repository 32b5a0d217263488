/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the ledger's
//! [config](crate::config::LedgerConfig).
//!
//! The ledger logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following
//! snippet is how a [CommitBlock](crate::events::CommitBlockEvent) is printed:
//!
//! ```text
//! CommitBlock, 1701329264, 42, fNGCJyk
//! ```
//!
//! In the snippet, the third value is the committed height and the fourth value is the first seven
//! characters of the Base64 encoding of the committed block's hash.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const EXECUTE_BLOCK: &str = "ExecuteBlock";
pub const COMMIT_BLOCK: &str = "CommitBlock";
pub const FLUSH_HEADER_INDEX: &str = "FlushHeaderIndex";
pub const SUBMIT_FAILURE: &str = "SubmitFailure";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ExecuteBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |execute_block_event: &ExecuteBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                EXECUTE_BLOCK,
                secs_since_unix_epoch(execute_block_event.timestamp),
                execute_block_event.height,
                first_seven_base64_chars(&execute_block_event.block.bytes()),
                first_seven_base64_chars(&execute_block_event.state_root.bytes()),
                first_seven_base64_chars(&execute_block_event.cross_states_root.bytes()),
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_block_event: &CommitBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMMIT_BLOCK,
                secs_since_unix_epoch(commit_block_event.timestamp),
                commit_block_event.height,
                first_seven_base64_chars(&commit_block_event.block.bytes()),
            )
        };
        Box::new(logger)
    }
}

impl Logger for FlushHeaderIndexEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |flush_header_index_event: &FlushHeaderIndexEvent| {
            log::info!(
                "{}, {}, {}",
                FLUSH_HEADER_INDEX,
                secs_since_unix_epoch(flush_header_index_event.timestamp),
                flush_header_index_event.stored_count,
            )
        };
        Box::new(logger)
    }
}

impl Logger for SubmitFailureEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |submit_failure_event: &SubmitFailureEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                SUBMIT_FAILURE,
                secs_since_unix_epoch(submit_failure_event.timestamp),
                submit_failure_event.height,
                submit_failure_event.reason,
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first
// 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}

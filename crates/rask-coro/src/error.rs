// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler error types.

use std::io;

use thiserror::Error;

use crate::coroutine::CoId;

/// Misuse of the scheduler, or failure to set one up.
///
/// The panicking entry points (`resume`, `yield_now`) turn these into
/// panics carrying the same message.
#[derive(Debug, Error)]
pub enum CoError {
    #[error("cannot resume coroutine {requested}: coroutine {running} is running")]
    Busy { running: CoId, requested: CoId },

    #[error("coroutine id {id} is out of range (table capacity {capacity})")]
    OutOfRange { id: CoId, capacity: usize },

    #[error("yield called while no coroutine is running")]
    NotRunning,

    #[error("coroutine {id} used {depth} bytes of stack, scratch stack holds {limit}")]
    StackOverflow { id: CoId, depth: usize, limit: usize },

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error("failed to map scratch stack of {size} bytes: {source}")]
    StackAlloc {
        size: usize,
        #[source]
        source: io::Error,
    },
}

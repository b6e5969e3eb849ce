// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Coroutine representation.
//!
//! A coroutine is passive data owned by one table slot. The scheduler
//! drives its state machine:
//!
//! Ready --resume--> Running --yield--> Suspended --resume--> Running
//!                      \--return--> Dead (slot cleared)

use crate::context::ExecContext;
use crate::scheduler::Scheduler;
use crate::stack::Snapshot;

/// Handle of a coroutine: its slot index in the scheduler's table.
///
/// Stable while the coroutine lives. Once it is Dead the slot can be
/// handed to a new coroutine, so re-check `status` before reusing an old id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoId(usize);

impl CoId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for CoId {
    fn from(index: usize) -> Self {
        CoId(index)
    }
}

impl std::fmt::Display for CoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coroutine lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoStatus {
    /// Finished, or the slot is empty.
    Dead = 0,
    /// Created, never resumed.
    Ready = 1,
    /// Owns the scratch stack right now.
    Running = 2,
    /// Yielded; its stack lives in its snapshot.
    Suspended = 3,
}

/// Boxed coroutine body. Captured state is the user data.
pub(crate) type CoFn<C> = Box<dyn FnOnce(&Scheduler<C>)>;

pub(crate) struct Coroutine<C: ExecContext> {
    pub status: CoStatus,
    /// Taken by the trampoline on first run.
    pub entry: Option<CoFn<C>>,
    pub snapshot: Snapshot,
    /// Empty until first resume; meaningful only while Running or Suspended.
    pub context: C,
}

impl<C: ExecContext> Coroutine<C> {
    pub fn new(entry: CoFn<C>) -> Self {
        Self {
            status: CoStatus::Ready,
            entry: Some(entry),
            snapshot: Snapshot::new(),
            context: C::empty(),
        }
    }
}

impl<C: ExecContext> std::fmt::Debug for Coroutine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("status", &self.status)
            .field("started", &self.entry.is_none())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

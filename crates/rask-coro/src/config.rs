// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler configuration.

use crate::error::CoError;

/// Default scratch stack size: 1 MiB.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Default number of slots in a fresh coroutine table.
pub const DEFAULT_CAPACITY: usize = 16;

/// Smallest scratch stack we accept. Below this even the trampoline and a
/// panic handler can run out of room.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Tuning knobs for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Bytes of scratch stack. Bounds the deepest stack any coroutine may
    /// have at a yield. Rounded up to the page size when mapped.
    pub stack_size: usize,
    /// Slots allocated up front. The table doubles when it fills.
    pub initial_capacity: usize,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            initial_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn initial_capacity(mut self, slots: usize) -> Self {
        self.initial_capacity = slots;
        self
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(CoError::InvalidConfig(format!(
                "stack_size {} is below the minimum of {} bytes",
                self.stack_size, MIN_STACK_SIZE
            )));
        }
        if self.initial_capacity == 0 {
            return Err(CoError::InvalidConfig(
                "initial_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

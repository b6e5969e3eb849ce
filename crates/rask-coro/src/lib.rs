// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Rask coroutine runtime: stackful coroutines on one shared stack.
//!
//! A single-threaded, cooperative scheduler. Coroutines are ordinary
//! closures that can call `yield_now()` at any call depth and later
//! continue where they stopped. All of them execute on one scratch stack;
//! a suspended coroutine's frames are copied out into a private snapshot
//! and copied back to the same addresses when it is resumed, so memory
//! cost per coroutine is its actual stack depth, not a reserved stack.
//!
//! Components:
//! - `scheduler` : coroutine manager: create/resume/yield/status/close
//! - `coroutine` : ids, status, per-coroutine state
//! - `stack`     : scratch stack mapping and snapshot save/restore
//! - `context`   : execution context backends (register swap, ucontext)
//! - `config`    : stack size and table capacity
//!
//! Not thread-safe and not meant to be: a `Scheduler` stays on the thread
//! that created it. Any number of schedulers may coexist.

pub mod config;
pub mod context;
pub mod coroutine;
pub mod error;
pub mod scheduler;
pub mod stack;
mod table;

pub use config::SchedulerConfig;
pub use context::{DefaultContext, Entry, ExecContext, RegisterContext};
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub use context::UContext;
pub use coroutine::{CoId, CoStatus};
pub use error::CoError;
pub use scheduler::Scheduler;
pub use stack::StackRegion;

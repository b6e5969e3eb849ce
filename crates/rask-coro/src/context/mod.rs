// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Execution contexts.
//!
//! The scheduler only needs two things from the platform: bind a fresh
//! context to a stack so it starts at a given function, and swap between
//! two contexts. Backends:
//! - `register` : hand-written callee-saved register swap (default)
//! - `ucontext` : glibc `swapcontext`, enabled as default by the
//!   `ucontext` feature

use crate::stack::StackRegion;

pub mod register;
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub mod ucontext;

pub use register::RegisterContext;
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub use ucontext::UContext;

/// First function a bound context runs. Gets the `arg` given to `bind`
/// and must never return; it leaves by switching to another context.
pub type Entry = extern "C" fn(usize) -> !;

/// A saved point of execution that control can be switched into.
///
/// # Safety
/// Implementors must save every register the platform ABI treats as
/// callee-saved, and `stack_pointer` must report the exact lowest stack
/// address the suspended context still needs. The scheduler copies
/// `[stack_pointer, top)` out and back in on that guarantee.
pub unsafe trait ExecContext: Sized {
    /// A context slot for a thread that is already running. Only valid as
    /// the `from` side of a switch until something is saved into it.
    fn empty() -> Self;

    /// Prepare a context that starts at `entry(arg)` on `stack`.
    ///
    /// # Safety
    /// Writes to the top of `stack`; nothing else may be live there.
    unsafe fn bind(stack: StackRegion, entry: Entry, arg: usize) -> Self;

    /// Save the running context into `from` and continue `to`. Returns
    /// when some other context switches back into `from`.
    ///
    /// # Safety
    /// `to` must be bound or previously saved, and its stack contents must
    /// be exactly what they were when it was saved.
    unsafe fn switch(from: *mut Self, to: *const Self);

    /// Stack pointer saved by the last switch away from this context.
    fn stack_pointer(&self) -> usize;
}

#[cfg(all(feature = "ucontext", target_os = "linux", target_env = "gnu"))]
pub type DefaultContext = UContext;

#[cfg(not(all(feature = "ucontext", target_os = "linux", target_env = "gnu")))]
pub type DefaultContext = RegisterContext;

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! glibc ucontext backend.
//!
//! `ucontext_t` is self-referential on x86_64 (`uc_mcontext.fpregs` points
//! into the same struct), so it is boxed and never moved after
//! `getcontext`/`swapcontext` fill it in.

use std::io;
use std::mem;
use std::ptr;

use super::{Entry, ExecContext};
use crate::stack::StackRegion;

pub struct UContext {
    uc: Box<libc::ucontext_t>,
}

unsafe impl ExecContext for UContext {
    fn empty() -> Self {
        // SAFETY: ucontext_t is plain data; all-zero is a valid bit pattern.
        Self {
            uc: Box::new(unsafe { mem::zeroed() }),
        }
    }

    unsafe fn bind(stack: StackRegion, entry: Entry, arg: usize) -> Self {
        let mut ctx = Self::empty();
        let uc: *mut libc::ucontext_t = &mut *ctx.uc;
        if libc::getcontext(uc) != 0 {
            panic!("getcontext failed: {}", io::Error::last_os_error());
        }
        (*uc).uc_stack.ss_sp = stack.base() as *mut libc::c_void;
        (*uc).uc_stack.ss_size = stack.len();
        (*uc).uc_stack.ss_flags = 0;
        (*uc).uc_link = ptr::null_mut();

        // makecontext only passes int-sized arguments; split both words.
        let entry = entry as usize;
        let start = mem::transmute::<extern "C" fn(u32, u32, u32, u32), extern "C" fn()>(start);
        libc::makecontext(
            uc,
            start,
            4,
            entry as u32,
            (entry >> 32) as u32,
            arg as u32,
            (arg >> 32) as u32,
        );
        ctx
    }

    unsafe fn switch(from: *mut Self, to: *const Self) {
        let from: *mut libc::ucontext_t = &mut *(*from).uc;
        let to: *const libc::ucontext_t = &*(*to).uc;
        if libc::swapcontext(from, to) != 0 {
            panic!("swapcontext failed: {}", io::Error::last_os_error());
        }
    }

    #[cfg(target_arch = "x86_64")]
    fn stack_pointer(&self) -> usize {
        self.uc.uc_mcontext.gregs[libc::REG_RSP as usize] as usize
    }

    #[cfg(target_arch = "aarch64")]
    fn stack_pointer(&self) -> usize {
        self.uc.uc_mcontext.sp as usize
    }
}

extern "C" fn start(entry_lo: u32, entry_hi: u32, arg_lo: u32, arg_hi: u32) {
    let entry = ((entry_hi as usize) << 32) | entry_lo as usize;
    let arg = ((arg_hi as usize) << 32) | arg_lo as usize;
    // SAFETY: reassembled from the Entry pointer split in `bind`.
    let entry = unsafe { mem::transmute::<usize, Entry>(entry) };
    entry(arg)
}

impl std::fmt::Debug for UContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UContext")
            .field("sp", &format_args!("{:#x}", self.stack_pointer()))
            .finish()
    }
}

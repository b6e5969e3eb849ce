// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Register-swap backend.
//!
//! `swap_stack` pushes the callee-saved registers onto the current stack,
//! stores the stack pointer into the `from` handle, loads the `to` stack
//! pointer and pops the registers saved there. The handle is therefore just
//! a stack pointer and everything else lives in the coroutine's own frames,
//! which is what the snapshot copies.
//!
//! A freshly bound stack carries a fake saved frame whose return address is
//! `bootstrap`, which moves `arg` into the first argument register and calls
//! `entry`.

use std::arch::naked_asm;
use std::ptr;

use super::{Entry, ExecContext};
use crate::stack::StackRegion;

#[cfg(not(all(unix, any(target_arch = "x86_64", target_arch = "aarch64"))))]
compile_error!("rask-coro register contexts support x86_64 and aarch64 on unix only");

/// Saved stack pointer of a suspended context.
#[derive(Debug)]
pub struct RegisterContext {
    sp: usize,
}

unsafe impl ExecContext for RegisterContext {
    fn empty() -> Self {
        Self { sp: 0 }
    }

    unsafe fn bind(stack: StackRegion, entry: Entry, arg: usize) -> Self {
        let top = stack.top() & !0xF;
        let frame = initial_frame(entry as usize, arg);
        let sp = top - std::mem::size_of_val(&frame);
        ptr::copy_nonoverlapping(frame.as_ptr(), sp as *mut usize, frame.len());
        Self { sp }
    }

    unsafe fn switch(from: *mut Self, to: *const Self) {
        swap_stack(ptr::addr_of_mut!((*from).sp), (*to).sp);
    }

    fn stack_pointer(&self) -> usize {
        self.sp
    }
}

// Frame layout popped by swap_stack, lowest address first:
// r15 r14 r13 r12 rbx rbp ret
#[cfg(target_arch = "x86_64")]
fn initial_frame(entry: usize, arg: usize) -> [usize; 7] {
    [0, 0, entry, arg, 0, 0, bootstrap as *const () as usize]
}

#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
unsafe extern "C" fn swap_stack(_from: *mut usize, _to: usize) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}

// Entered by `ret` with rsp at the 16-aligned top, so the call below
// leaves `entry` with the alignment the ABI expects.
#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
unsafe extern "C" fn bootstrap() {
    naked_asm!("mov rdi, r12", "call r13", "ud2")
}

// Frame layout, lowest address first (0xa0 bytes):
// x19..x28, x29 (fp), x30 (lr), d8..d15
#[cfg(target_arch = "aarch64")]
fn initial_frame(entry: usize, arg: usize) -> [usize; 20] {
    let mut frame = [0usize; 20];
    frame[0] = arg;
    frame[1] = entry;
    frame[11] = bootstrap as *const () as usize;
    frame
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
unsafe extern "C" fn swap_stack(_from: *mut usize, _to: usize) {
    naked_asm!(
        "sub sp, sp, #0xa0",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp x29, x30, [sp, #0x50]",
        "stp d8, d9, [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x9, sp",
        "str x9, [x0]",
        "mov sp, x1",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8, d9, [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #0xa0",
        "ret",
    )
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
unsafe extern "C" fn bootstrap() {
    naked_asm!("mov x0, x19", "blr x20", "brk #1")
}

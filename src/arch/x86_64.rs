//! x86_64 System V implementation of the context-switch primitive.

use std::arch::naked_asm;

/// Callee-saved register state of a suspended context.
///
/// Offsets are fixed by the assembly below; keep them in sync. The fields
/// are only ever read and written by that assembly.
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
pub(crate) struct Context {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

/// Saves the caller's state into `from`, then resumes `to` where it last
/// switched out. Returns when a later switch targets `from` again.
///
/// # Safety
///
/// `from` must be valid for writes. `to` must hold state captured by an
/// earlier `switch_ctx`/`start_ctx` save on this thread, and the stack it
/// points into must still be alive.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch_ctx(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        // spill callee-saved state into `from` (rdi)
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // reload from `to` (rsi)
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        // resume `to` right after the call that suspended it
        "ret",
    )
}

/// Saves the caller's state into `from`, then enters `entry` at the top of a
/// fresh stack. `entry` must never return; there is no frame to return to.
///
/// # Safety
///
/// `stack_top` must be the 16-aligned top of a stack block that stays valid
/// for as long as the new context can run.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn start_ctx(
    _from: *mut Context,
    _stack_top: usize,
    _entry: extern "C" fn() -> !,
) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // enter on the fresh stack (rsi); the 8-byte bias reproduces the
        // alignment state a function sees right after a `call`
        "lea rsp, [rsi - 8]",
        "xor ebp, ebp",
        "jmp rdx",
    )
}

//! AArch64 (AAPCS64) implementation of the context-switch primitive.
//!
//! AAPCS64 requires d8-d15 to be preserved across calls, so they are part of
//! the saved block alongside sp, fp, lr and x19-x28.

use std::arch::naked_asm;

/// Callee-saved register state of a suspended context.
///
/// Offsets are fixed by the assembly below; keep them in sync. The fields
/// are only ever read and written by that assembly.
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
pub(crate) struct Context {
    sp: u64,
    fp: u64,
    lr: u64,
    x19_x28: [u64; 10],
    d8_d15: [u64; 8],
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
        // spill callee-saved state into `from` (x0)
        "mov x2, sp",
        "str x2, [x0, #0x00]",
        "stp x29, x30, [x0, #0x08]",
        "stp x19, x20, [x0, #0x18]",
        "stp x21, x22, [x0, #0x28]",
        "stp x23, x24, [x0, #0x38]",
        "stp x25, x26, [x0, #0x48]",
        "stp x27, x28, [x0, #0x58]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // reload from `to` (x1)
        "ldr x2, [x1, #0x00]",
        "mov sp, x2",
        "ldp x29, x30, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x18]",
        "ldp x21, x22, [x1, #0x28]",
        "ldp x23, x24, [x1, #0x38]",
        "ldp x25, x26, [x1, #0x48]",
        "ldp x27, x28, [x1, #0x58]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
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
        "mov x3, sp",
        "str x3, [x0, #0x00]",
        "stp x29, x30, [x0, #0x08]",
        "stp x19, x20, [x0, #0x18]",
        "stp x21, x22, [x0, #0x28]",
        "stp x23, x24, [x0, #0x38]",
        "stp x25, x26, [x0, #0x48]",
        "stp x27, x28, [x0, #0x58]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // enter on the fresh stack (x1) with cleared frame/link registers
        "mov sp, x1",
        "mov x29, xzr",
        "mov x30, xzr",
        "br x2",
    )
}

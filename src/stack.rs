//! Stack memory for coroutines.
//!
//! The engine never allocates or frees stack memory on its own: a coroutine
//! runs on a caller-provided aligned byte block wrapped in [`Stack`].
//! [`OwnedStack`] is the convenience owner over the global allocator for
//! callers that do not bring their own memory.
//!
//! The word at a stack's base holds a canary constant checked before every
//! suspend. This is a best-effort heuristic: it catches a canary overwrite or
//! an out-of-range stack pointer, not every possible corruption.

use std::alloc::{alloc, dealloc, Layout};
use std::mem;
use std::ptr::NonNull;

use crate::config::config;
use crate::err::Error;

/// Required alignment of a stack's base address.
pub const STACK_ALIGNMENT: usize = 16;

// Stamped into the word at the stack base on coroutine construction and
// checked before every suspend. A changed value means the coroutine ran out
// of stack or scribbled over its own base; either way the context can no
// longer be trusted.
const CANARY: usize = 0x5afe_57ac_5afe_57ac;

pub(crate) const WORD_SIZE: usize = mem::size_of::<usize>();

/// A raw view of caller-owned stack memory.
///
/// `base` is the lowest address; stacks grow downwards towards it. The word
/// at the base is reserved for the overflow canary and is never handed to
/// the switch primitive.
#[derive(Clone, Copy, Debug)]
pub struct Stack {
    base: NonNull<u8>,
    size: usize,
}

impl Stack {
    /// Wraps a raw byte block as stack memory.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `size` bytes, aligned to
    /// [`STACK_ALIGNMENT`], used by at most one coroutine at a time, and the
    /// memory must outlive any coroutine constructed on it. The engine
    /// cannot detect a violation beyond the canary heuristic.
    pub unsafe fn from_raw_parts(base: *mut u8, size: usize) -> Stack {
        assert_eq!(
            base as usize % STACK_ALIGNMENT,
            0,
            "stack base must be aligned to STACK_ALIGNMENT"
        );
        Stack {
            base: NonNull::new_unchecked(base),
            size,
        }
    }

    /// The lowest address of the stack.
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// One past the highest address of the stack.
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.size) }
    }

    /// The stack size in bytes, including the reserved canary word.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn write_canary(&self) {
        unsafe { (self.base.as_ptr() as *mut usize).write(CANARY) }
    }

    pub(crate) fn canary_intact(&self) -> bool {
        unsafe { (self.base.as_ptr() as *const usize).read_volatile() == CANARY }
    }

    // whether `sp` is inside the usable range: strictly above the canary
    // word, at most one past the top
    pub(crate) fn holds_stack_ptr(&self, sp: usize) -> bool {
        let lo = self.base.as_ptr() as usize + WORD_SIZE;
        let hi = self.base.as_ptr() as usize + self.size;
        sp > lo && sp <= hi
    }
}

/// Heap-allocated stack memory, freed on drop.
///
/// Dropping an `OwnedStack` while a coroutine constructed on it is not yet
/// `Done` frees memory that still holds live frames; the
/// [`Coroutine::new`](crate::Coroutine::new) safety contract forbids it.
pub struct OwnedStack {
    stack: Stack,
    layout: Layout,
}

impl OwnedStack {
    /// Allocates `size` bytes of stack memory from the global allocator.
    pub fn new(size: usize) -> Result<OwnedStack, Error> {
        if size == 0 {
            return Err(Error::StackAlloc);
        }
        let layout = Layout::from_size_align(size, STACK_ALIGNMENT).map_err(|_| Error::StackAlloc)?;
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(Error::StackAlloc);
        }
        let stack = unsafe { Stack::from_raw_parts(ptr, size) };
        Ok(OwnedStack { stack, layout })
    }

    /// Allocates a stack of the configured default size.
    pub fn with_default_size() -> Result<OwnedStack, Error> {
        Self::new(config().get_stack_size())
    }

    /// The raw view handed to coroutine construction.
    pub fn stack(&self) -> Stack {
        self.stack
    }
}

impl Drop for OwnedStack {
    fn drop(&mut self) {
        unsafe { dealloc(self.stack.base(), self.layout) }
    }
}

// an unused stack is plain memory; moving it to the thread that will run the
// coroutine is fine
unsafe impl Send for OwnedStack {}

// Address of the current stack pointer, approximated by the address of a
// local. Accurate enough for the headroom estimate and the overflow guard.
#[inline(always)]
pub(crate) fn current_stack_ptr() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker as *const u8) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canary_stamp_and_check() {
        let owned = OwnedStack::new(1024).unwrap();
        let stack = owned.stack();
        stack.write_canary();
        assert!(stack.canary_intact());
        unsafe { (stack.base() as *mut usize).write(0) };
        assert!(!stack.canary_intact());
    }

    #[test]
    fn stack_ptr_bounds() {
        let owned = OwnedStack::new(256).unwrap();
        let stack = owned.stack();
        let base = stack.base() as usize;
        assert!(!stack.holds_stack_ptr(base));
        assert!(!stack.holds_stack_ptr(base + WORD_SIZE));
        assert!(stack.holds_stack_ptr(base + WORD_SIZE + 1));
        assert!(stack.holds_stack_ptr(base + 256));
        assert!(!stack.holds_stack_ptr(base + 257));
    }

    #[test]
    fn zero_sized_allocation_rejected() {
        assert!(matches!(OwnedStack::new(0), Err(Error::StackAlloc)));
    }
}

//! Coroutine objects and the switch protocol.
//!
//! Both public entry points reduce to one transition, `switch_to`: mark the
//! suspender, rebind the parent link on resume, record the new active
//! context, then hand over to the switch primitive. The parent link is
//! rebound on every resume rather than fixed at creation, so a coroutine can
//! be resumed from different call sites across its lifetime and suspend
//! always returns to its most recent resumer. That gives strict LIFO nesting
//! and keeps the active chain a single path back to the thread's root.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::arch::{self, Context};
use crate::err::{fatal, Error};
use crate::runtime::{self, CoroId};
use crate::stack::{current_stack_ptr, Stack, STACK_ALIGNMENT, WORD_SIZE};

/// Execution state of a coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroStatus {
    /// not currently running; the initial state
    Suspended,
    /// running right now on its owning thread
    Active,
    /// the entry function returned; terminal, the stack below it is dead
    Done,
}

pub(crate) struct Inner {
    id: CoroId,
    status: Cell<CoroStatus>,
    invocations: Cell<u64>,
    started: Cell<bool>,
    // rebound on every resume: whoever performed the last resume; a
    // back-reference, never an ownership edge
    parent: RefCell<Option<Coroutine>>,
    // written by the switch primitive while shared references exist
    ctx: UnsafeCell<Context>,
    stack: Option<Stack>,
    entry: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// A handle to a coroutine (or to a thread's root context).
///
/// Handles are cheap reference-counted clones. They are deliberately not
/// `Send`: all bookkeeping lives in the runtime of the thread that created
/// the coroutine, so handles cannot cross threads by construction.
///
/// Dropping every handle to a coroutine that was started but has not
/// finished leaks the state captured on its stack; the engine performs no
/// forced unwinding.
#[derive(Clone)]
pub struct Coroutine {
    inner: Rc<Inner>,
}

impl Coroutine {
    /// Creates a coroutine bound to `stack` that will run `f` once resumed.
    ///
    /// Fails with [`Error::StackTooSmall`] if the stack cannot hold the
    /// reserved canary word. The entry function does not start executing
    /// until the first [`resume`](Coroutine::resume).
    ///
    /// # Safety
    ///
    /// The memory behind `stack` must stay valid and untouched by anything
    /// else until this coroutine is `Done`. The stack must also be large
    /// enough for `f`'s frames plus the trampoline; exceeding it is
    /// undefined behavior that the canary guard only detects after the fact.
    pub unsafe fn new<F>(f: F, stack: Stack) -> Result<Coroutine, Error>
    where
        F: FnOnce() + 'static,
    {
        if stack.size() <= WORD_SIZE {
            return Err(Error::StackTooSmall);
        }
        stack.write_canary();
        let id = runtime::next_id();
        trace!("created coroutine {} with a {} byte stack", id, stack.size());
        Ok(Coroutine {
            inner: Rc::new(Inner {
                id,
                status: Cell::new(CoroStatus::Suspended),
                invocations: Cell::new(0),
                started: Cell::new(false),
                parent: RefCell::new(None),
                ctx: UnsafeCell::new(Context::default()),
                stack: Some(stack),
                entry: RefCell::new(Some(Box::new(f))),
            }),
        })
    }

    // the synthetic context standing in for the thread's native stack
    pub(crate) fn root(id: CoroId) -> Coroutine {
        Coroutine {
            inner: Rc::new(Inner {
                id,
                status: Cell::new(CoroStatus::Active),
                invocations: Cell::new(0),
                started: Cell::new(true),
                parent: RefCell::new(None),
                ctx: UnsafeCell::new(Context::default()),
                stack: None,
                entry: RefCell::new(None),
            }),
        }
    }

    /// Transfers control into this coroutine, making the caller its parent
    /// for this invocation. Returns once the coroutine suspends or finishes.
    ///
    /// Resuming a `Done` coroutine aborts the process with an
    /// identity-annotated diagnostic: its machine state no longer exists and
    /// there is no safe way to unwind a half-entered switch.
    ///
    /// # Panics
    ///
    /// Panics when the coroutine is already `Active`, i.e. when it tries to
    /// resume itself.
    pub fn resume(&self) {
        match self.inner.status.get() {
            CoroStatus::Done => fatal(format_args!(
                "fatal: resume of completed coroutine {} (invocations={})",
                self.inner.id,
                self.inner.invocations.get()
            )),
            CoroStatus::Active => panic!(
                "cannot resume coroutine {}: it is the running context",
                self.inner.id
            ),
            CoroStatus::Suspended => {}
        }
        trace!("resuming coroutine {}", self.inner.id);
        switch_to(self, true);
    }

    /// Current status.
    pub fn status(&self) -> CoroStatus {
        self.inner.status.get()
    }

    /// Diagnostic identity of this context.
    pub fn id(&self) -> CoroId {
        self.inner.id
    }

    /// How many times control has been switched into this context.
    pub fn invocations(&self) -> u64 {
        self.inner.invocations.get()
    }

    /// Size of the bound stack in bytes; 0 for the root context.
    pub fn stack_size(&self) -> usize {
        self.inner.stack.map_or(0, |s| s.size())
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.inner.id)
            .field("status", &self.inner.status.get())
            .finish()
    }
}

/// The active context on this thread; the root context when no coroutine is
/// running.
pub fn current() -> Coroutine {
    runtime::active()
}

/// Whether the caller is running inside a coroutine.
pub fn is_coroutine() -> bool {
    runtime::active().inner.stack.is_some()
}

/// Estimated unused stack headroom of the running coroutine, in bytes.
///
/// Returns 0 in the root context (its bounds are unknown) and 0 when the
/// probe already sits at or below the canary word. Diagnostic only: the
/// authoritative overflow check is the canary guard at suspend time.
pub fn remaining_stack_size() -> usize {
    let co = runtime::active();
    match co.inner.stack {
        Some(stack) => {
            let lo = stack.base() as usize + WORD_SIZE;
            current_stack_ptr()
                .saturating_sub(lo)
                .min(stack.size() - WORD_SIZE)
        }
        None => 0,
    }
}

/// Suspends the running coroutine, returning control to its most recent
/// resumer.
///
/// # Panics
///
/// Panics when called outside of any coroutine or when the overflow guard
/// trips; use [`try_suspend`] to handle those cases as errors.
pub fn suspend() {
    if let Err(e) = try_suspend() {
        panic!("cannot suspend: {}", e);
    }
}

/// Fallible variant of [`suspend`].
///
/// Fails with [`Error::SuspendFromMain`] when the root context is active,
/// and with [`Error::StackOverflow`] when the canary or stack-pointer check
/// fails. In the latter case no switch is performed and the coroutine must
/// not be resumed again.
pub fn try_suspend() -> Result<(), Error> {
    let co = runtime::active();
    let stack = match co.inner.stack {
        Some(stack) => stack,
        // no coroutine is running; the root context has nothing to return to
        None => return Err(Error::SuspendFromMain),
    };

    // overflow guard: best effort, but it runs before the switch so a
    // clobbered context cannot corrupt the parent's execution state
    let sp = current_stack_ptr();
    if !stack.canary_intact() || !stack.holds_stack_ptr(sp) {
        error!(
            "stack overflow detected on coroutine {}: sp={:#x}, stack={:#x}..{:#x}",
            co.inner.id,
            sp,
            stack.base() as usize,
            stack.top() as usize
        );
        return Err(Error::StackOverflow);
    }

    let parent = co
        .inner
        .parent
        .borrow()
        .clone()
        .expect("active coroutine has no parent");
    trace!("suspending coroutine {}", co.inner.id);
    switch_to(&parent, false);
    Ok(())
}

// The one transition both entry points reduce to:
//   1. suspender = active context
//   2. unless Done, mark it Suspended
//   3. on resume, rebind target.parent to the suspender
//   4. mark target Active, bump its invocation count, record it active
//   5. hand over to the switch primitive; returns when control comes back
fn switch_to(target: &Coroutine, establish_parent: bool) {
    let suspender = runtime::set_active(target.clone());

    if suspender.inner.status.get() != CoroStatus::Done {
        suspender.inner.status.set(CoroStatus::Suspended);
    }
    if establish_parent {
        *target.inner.parent.borrow_mut() = Some(suspender.clone());
    }
    target.inner.status.set(CoroStatus::Active);
    target.inner.invocations.set(target.inner.invocations.get() + 1);

    let from = suspender.inner.ctx.get();
    if !target.inner.started.replace(true) {
        // first entry: run the trampoline at the top of the fresh stack
        let stack = target.inner.stack.expect("the root context is never started");
        let top = stack.top() as usize & !(STACK_ALIGNMENT - 1);
        unsafe { arch::start_ctx(from, top, trampoline) };
    } else {
        let to = target.inner.ctx.get() as *const Context;
        unsafe { arch::switch_ctx(from, to) };
    }
    // control is back: a later switch retargeted the suspender
}

// First code that runs on a fresh coroutine stack, entered by
// `arch::start_ctx`. Must never return into the primitive's frame.
extern "C" fn trampoline() -> ! {
    {
        let co = runtime::active();
        let entry = co.inner.entry.borrow_mut().take();
        match entry {
            Some(f) => {
                // a panic must not unwind into the switch primitive; the
                // default hook has already reported it, so just die
                if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
                    fatal(format_args!("fatal: coroutine {} panicked", co.inner.id));
                }
            }
            None => fatal(format_args!("fatal: coroutine {} started twice", co.inner.id)),
        }
        debug!(
            "coroutine {} completed after {} invocations",
            co.inner.id,
            co.inner.invocations.get()
        );
    }
    switch_out_done()
}

// Completion switch back to the parent. Handle clones are confined to the
// inner block: the trampoline frame is abandoned by the final switch, and
// anything still alive in it would leak.
fn switch_out_done() -> ! {
    let (from, to) = {
        let co = runtime::active();
        co.inner.status.set(CoroStatus::Done);
        let parent = match co.inner.parent.borrow_mut().take() {
            Some(parent) => parent,
            None => fatal(format_args!(
                "fatal: completed coroutine {} has no parent to return to",
                co.inner.id
            )),
        };
        parent.inner.status.set(CoroStatus::Active);
        parent
            .inner
            .invocations
            .set(parent.inner.invocations.get() + 1);
        let prev = runtime::set_active(parent.clone());
        debug_assert!(Rc::ptr_eq(&prev.inner, &co.inner));
        (co.inner.ctx.get(), parent.inner.ctx.get() as *const Context)
    };
    // `to` stays valid across the switch: the parent is still referenced by
    // the runtime's active slot and by handles up the resume chain
    unsafe { arch::switch_ctx(from, to) };
    fatal(format_args!(
        "fatal: switch primitive re-entered a completed coroutine"
    ))
}

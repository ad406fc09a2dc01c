//! Per-thread coroutine runtime.
//!
//! Each OS thread owns a root context standing in for its native stack, a
//! handle to the currently active context and an identity counter. The
//! runtime is reached only through the resume/suspend/current entry points
//! and is never shared across threads; no synchronization is needed because
//! no two contexts on the same thread are ever simultaneously active.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::thread::{self, ThreadId};

use crate::coroutine_impl::Coroutine;

/// Identity of a context: owning thread plus per-thread sequence number.
///
/// The root context of every thread has sequence number 0; coroutines count
/// up from 1 and numbers are never reused within a thread's lifetime. Purely
/// diagnostic; no correctness logic hangs off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroId {
    thread: ThreadId,
    seq: u64,
}

impl CoroId {
    pub(crate) fn new(thread: ThreadId, seq: u64) -> CoroId {
        CoroId { thread, seq }
    }

    /// The thread this context belongs to.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Per-thread sequence number; 0 denotes the root context.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for CoroId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}#{}", self.thread, self.seq)
    }
}

struct Runtime {
    // the active context; holding a handle here keeps it alive across the
    // switch that installed it
    active: RefCell<Coroutine>,
    next_seq: Cell<u64>,
}

impl Runtime {
    fn new() -> Runtime {
        let root = Coroutine::root(CoroId::new(thread::current().id(), 0));
        Runtime {
            active: RefCell::new(root),
            next_seq: Cell::new(1),
        }
    }
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Issues a fresh identity for a coroutine created on this thread.
pub(crate) fn next_id() -> CoroId {
    RUNTIME.with(|rt| {
        let seq = rt.next_seq.get();
        rt.next_seq.set(seq + 1);
        CoroId::new(thread::current().id(), seq)
    })
}

/// The currently active context; the root when no coroutine is running.
pub(crate) fn active() -> Coroutine {
    RUNTIME.with(|rt| rt.active.borrow().clone())
}

/// Installs `co` as the active context, returning the one it displaces.
pub(crate) fn set_active(co: Coroutine) -> Coroutine {
    RUNTIME.with(|rt| std::mem::replace(&mut *rt.active.borrow_mut(), co))
}

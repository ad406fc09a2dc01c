//! # Stackful coroutine switching engine
//!
//! `weft` creates independent call stacks and transfers control between them
//! at explicit suspend/resume points. It is the low-level substitute for OS
//! threads within a single OS thread: a building block for cooperative
//! multitasking, generators and fiber schedulers.
//!
//! ## Features
//!
//! * Symmetric transfer: `resume` enters a coroutine, `suspend` returns to
//!   whoever resumed it last, with strict LIFO nesting
//! * One switching engine, no scheduler: callers decide who runs next
//! * Caller-owned stacks with a canary-based overflow guard
//! * Per-thread identity and invocation bookkeeping for diagnostics
//! * Thread-local throughout: each OS thread owns an independent coroutine
//!   tree and handles do not cross threads
//!
//! ## Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use weft::{suspend, CoroStatus, Coroutine, OwnedStack};
//!
//! let stack = OwnedStack::new(64 * 1024).unwrap();
//! let value = Rc::new(Cell::new(0));
//!
//! let inner = value.clone();
//! let co = unsafe {
//!     Coroutine::new(
//!         move || {
//!             for i in 1..=3 {
//!                 inner.set(i);
//!                 suspend();
//!             }
//!         },
//!         stack.stack(),
//!     )
//! }
//! .unwrap();
//!
//! for i in 1..=3 {
//!     co.resume();
//!     assert_eq!(value.get(), i);
//!     assert_eq!(co.status(), CoroStatus::Suspended);
//! }
//!
//! co.resume();
//! assert_eq!(co.status(), CoroStatus::Done);
//! ```

#[macro_use]
#[doc(hidden)]
extern crate log;

mod arch;
mod config;
mod err;
#[macro_use]
mod macros;
mod coroutine_impl;
mod runtime;
mod stack;

pub mod coroutine;

pub use crate::config::{config, Config};
pub use crate::coroutine::{
    current, is_coroutine, remaining_stack_size, suspend, try_suspend, CoroId, CoroStatus,
    Coroutine,
};
pub use crate::err::Error;
pub use crate::stack::{OwnedStack, Stack, STACK_ALIGNMENT};

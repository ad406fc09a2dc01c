//! `weft` configuration interface.
//!

use std::sync::atomic::{AtomicUsize, Ordering};

// default stack size for `OwnedStack::with_default_size`, in bytes
const DEFAULT_STACK_SIZE: usize = 0x2_0000;

static STACK_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_STACK_SIZE);

/// `weft` configuration type
pub struct Config;

/// get the global configuration instance
pub fn config() -> Config {
    Config
}

impl Config {
    /// set the default coroutine stack size in bytes
    ///
    /// only affects stacks allocated after the call; stacks already handed
    /// to coroutines keep their size
    pub fn set_stack_size(&self, size: usize) -> &Self {
        info!("set stack size={:?}", size);
        STACK_SIZE.store(size, Ordering::Release);
        self
    }

    /// get the default coroutine stack size
    pub fn get_stack_size(&self) -> usize {
        STACK_SIZE.load(Ordering::Acquire)
    }
}

/// macro used to create a coroutine bound to a stack
///
/// this is a convenient wrapper for [`Coroutine::new`] that checks the entry
/// closure's bounds without an `unsafe` block at every call site. The stack
/// contract of [`Coroutine::new`] still applies: the memory must stay valid
/// and exclusive until the coroutine is done.
///
/// [`Coroutine::new`]: coroutine/struct.Coroutine.html#method.new
#[macro_export]
macro_rules! co {
    ($stack:expr, $func:expr) => {{
        fn _co_check<F>(f: F) -> F
        where
            F: FnOnce() + 'static,
        {
            f
        }
        let f = _co_check($func);
        unsafe { $crate::coroutine::Coroutine::new(f, $stack) }
    }};
}

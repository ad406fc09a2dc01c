//! The context-switch primitive.
//!
//! The switch protocol treats this module as an opaque collaborator with two
//! operations: `start_ctx` enters a fresh stack for the first time and
//! `switch_ctx` transfers control between two contexts that have both run
//! before. Both save the caller's callee-saved state into `from` and do not
//! return until a later switch targets `from` again.
//!
//! `start_ctx` writes nothing to the new stack before entering it, so
//! preparing a coroutine costs nothing beyond the canary stamp.

cfg_if::cfg_if! {
    if #[cfg(all(unix, target_arch = "x86_64"))] {
        mod x86_64;
        pub(crate) use self::x86_64::{start_ctx, switch_ctx, Context};
    } else if #[cfg(all(unix, target_arch = "aarch64"))] {
        mod aarch64;
        pub(crate) use self::aarch64::{start_ctx, switch_ctx, Context};
    } else {
        compile_error!(
            "unsupported target: the context-switch primitive is only implemented \
             for x86_64 and aarch64 on unix"
        );
    }
}

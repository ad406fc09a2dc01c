// re-export coroutine interface
pub use crate::coroutine_impl::{
    current, is_coroutine, remaining_stack_size, suspend, try_suspend, CoroStatus, Coroutine,
};
pub use crate::runtime::CoroId;

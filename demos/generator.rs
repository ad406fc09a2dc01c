//! A Fibonacci generator built directly on resume/suspend.
//!
//! Run with `RUST_LOG=trace` to watch the switches.

use std::cell::Cell;
use std::rc::Rc;

use weft::{suspend, CoroStatus, Coroutine, OwnedStack};

fn main() {
    env_logger::init();

    let stack = OwnedStack::with_default_size().unwrap();
    let slot = Rc::new(Cell::new(0u64));

    let out = slot.clone();
    let fib = unsafe {
        Coroutine::new(
            move || {
                let (mut a, mut b) = (0u64, 1u64);
                for _ in 0..10 {
                    out.set(a);
                    let next = a + b;
                    a = b;
                    b = next;
                    suspend();
                }
            },
            stack.stack(),
        )
    }
    .unwrap();

    loop {
        fib.resume();
        if fib.status() != CoroStatus::Suspended {
            break;
        }
        println!("fib -> {}", slot.get());
    }

    println!("generator {} finished", fib.id());
}

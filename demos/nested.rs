//! Nested resumption: a coroutine resuming another coroutine, with control
//! always returning to the most recent resumer.

use weft::{co, current, remaining_stack_size, suspend, OwnedStack};

fn main() {
    env_logger::init();

    let outer_stack = OwnedStack::with_default_size().unwrap();
    let inner_stack = OwnedStack::with_default_size().unwrap();

    let inner_view = inner_stack.stack();
    let outer = co!(outer_stack.stack(), move || {
        println!(
            "[outer {}] started, ~{} bytes of stack left",
            current().id(),
            remaining_stack_size()
        );

        let inner = co!(inner_view, || {
            println!("[inner {}] started", current().id());
            suspend();
            println!("[inner {}] finishing", current().id());
        })
        .unwrap();

        inner.resume();
        println!("[outer] inner suspended, yielding to main");
        suspend();
        inner.resume();
        println!("[outer] inner done ({:?})", inner.status());
    })
    .unwrap();

    outer.resume();
    println!("[main] outer suspended");
    outer.resume();
    println!("[main] outer done ({:?})", outer.status());
}

use std::cell::{Cell, RefCell};
use std::env;
use std::process::Command;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

use weft::{
    co, config, current, is_coroutine, remaining_stack_size, suspend, try_suspend, CoroStatus,
    Error, OwnedStack,
};

#[test]
fn status_lifecycle() {
    let stack = OwnedStack::new(64 * 1024).unwrap();
    let co = co!(stack.stack(), || {
        assert_eq!(current().status(), CoroStatus::Active);
        suspend();
    })
    .unwrap();

    assert_eq!(co.status(), CoroStatus::Suspended);
    co.resume();
    assert_eq!(co.status(), CoroStatus::Suspended);
    co.resume();
    assert_eq!(co.status(), CoroStatus::Done);
}

#[test]
fn round_trip_counter() {
    let stack = OwnedStack::new(64 * 1024).unwrap();
    let counter = Rc::new(Cell::new(0u32));

    let inner = counter.clone();
    let co = co!(stack.stack(), move || {
        for _ in 0..3 {
            inner.set(inner.get() + 1);
            suspend();
        }
    })
    .unwrap();

    for i in 1..=3 {
        co.resume();
        assert_eq!(counter.get(), i);
        assert_eq!(co.status(), CoroStatus::Suspended);
    }
}

#[test]
fn invocation_counter_matches_resumes() {
    let stack = OwnedStack::new(64 * 1024).unwrap();
    let co = co!(stack.stack(), || {
        for _ in 0..4 {
            suspend();
        }
    })
    .unwrap();

    assert_eq!(co.invocations(), 0);
    for n in 1..=4 {
        co.resume();
        assert_eq!(co.invocations(), n);
    }
}

#[test]
fn config_stack_size_round_trip() {
    config().set_stack_size(0x4_0000);
    assert_eq!(config().get_stack_size(), 0x4_0000);

    let owned = OwnedStack::with_default_size().unwrap();
    assert_eq!(owned.stack().size(), 0x4_0000);
}

#[test]
#[should_panic(expected = "it is the running context")]
fn resume_of_running_context_panics() {
    // the root context is the running one here, so resuming it is an
    // attempt to resume ourselves
    current().resume();
}

#[test]
fn suspend_from_main_is_an_error() {
    assert!(!is_coroutine());
    assert_eq!(try_suspend().unwrap_err(), Error::SuspendFromMain);
    // the root context is untouched
    assert_eq!(current().status(), CoroStatus::Active);
    assert_eq!(current().id().seq(), 0);
    assert_eq!(current().stack_size(), 0);
}

#[test]
fn stack_size_boundaries() {
    let word = std::mem::size_of::<usize>();

    let owned = OwnedStack::new(word).unwrap();
    assert_eq!(co!(owned.stack(), || {}).unwrap_err(), Error::StackTooSmall);

    // two machine words are enough to construct (though not to run)
    let owned = OwnedStack::new(2 * word).unwrap();
    assert!(co!(owned.stack(), || {}).is_ok());
}

#[test]
fn per_thread_identities_are_independent() {
    let (tx, rx) = mpsc::channel();
    for _ in 0..2 {
        let tx = tx.clone();
        thread::spawn(move || {
            let stack = OwnedStack::new(64 * 1024).unwrap();
            let co = co!(stack.stack(), || {}).unwrap();
            tx.send((co.id().thread(), co.id().seq())).unwrap();
        });
    }
    drop(tx);

    let ids: Vec<_> = rx.iter().collect();
    assert_eq!(ids.len(), 2);
    // both threads start their coroutine sequence at 1, independently
    assert_eq!(ids[0].1, 1);
    assert_eq!(ids[1].1, 1);
    assert_ne!(ids[0].0, ids[1].0);
}

#[test]
fn nested_resume_returns_lifo() {
    let _ = env_logger::builder().is_test(true).try_init();

    let log = Rc::new(RefCell::new(Vec::new()));
    let outer_stack = OwnedStack::new(128 * 1024).unwrap();
    let inner_stack = OwnedStack::new(64 * 1024).unwrap();

    let log_outer = log.clone();
    let inner_view = inner_stack.stack();
    let outer = co!(outer_stack.stack(), move || {
        log_outer.borrow_mut().push("outer start");

        let log_inner = log_outer.clone();
        let inner = co!(inner_view, move || {
            log_inner.borrow_mut().push("inner start");
            suspend();
            log_inner.borrow_mut().push("inner end");
        })
        .unwrap();

        inner.resume();
        log_outer.borrow_mut().push("back in outer");
        suspend();
        inner.resume();
        log_outer.borrow_mut().push("outer end");
    })
    .unwrap();

    outer.resume();
    log.borrow_mut().push("back in main");
    outer.resume();
    assert_eq!(outer.status(), CoroStatus::Done);

    assert_eq!(
        *log.borrow(),
        [
            "outer start",
            "inner start",
            "back in outer",
            "back in main",
            "inner end",
            "outer end",
        ]
    );
}

#[test]
fn overflow_guard_detects_clobbered_canary() {
    let owned = OwnedStack::new(64 * 1024).unwrap();
    let stack = owned.stack();
    let base = stack.base() as usize;

    let co = co!(stack, move || {
        // scribble over the coroutine's own canary word: in bounds, but
        // exactly what a runaway stack would have destroyed
        unsafe { (base as *mut usize).write(0) };
        assert_eq!(try_suspend().unwrap_err(), Error::StackOverflow);
    })
    .unwrap();

    co.resume();
    assert_eq!(co.status(), CoroStatus::Done);
}

#[test]
fn overflow_guard_quiet_on_healthy_stack() {
    let owned = OwnedStack::new(256 * 1024).unwrap();
    let co = co!(owned.stack(), || {
        burn_stack(16 * 1024);
        assert!(try_suspend().is_ok());
    })
    .unwrap();

    co.resume();
    co.resume();
    assert_eq!(co.status(), CoroStatus::Done);
}

// consume roughly `amount` bytes of stack depth before returning
fn burn_stack(amount: usize) {
    let pad = std::hint::black_box([0u8; 1024]);
    if amount > 1024 {
        burn_stack(amount - 1024);
    }
    // keep the pad alive across the recursive call so frames stack up
    std::hint::black_box(&pad);
}

#[test]
fn remaining_stack_shrinks_with_use() {
    let owned = OwnedStack::new(128 * 1024).unwrap();
    let co = co!(owned.stack(), || {
        let before = remaining_stack_size();
        assert!(before > 0);
        let after = deep_probe(8);
        assert!(after < before);
    })
    .unwrap();

    co.resume();
    // the root context has no known bounds
    assert_eq!(remaining_stack_size(), 0);
}

fn deep_probe(depth: usize) -> usize {
    let pad = std::hint::black_box([0u8; 256]);
    let probed = if depth == 0 {
        remaining_stack_size()
    } else {
        deep_probe(depth - 1)
    };
    // keep the pad alive across the recursive call so frames stack up
    std::hint::black_box(&pad);
    probed
}

// Resuming a completed coroutine must abort the process, so this test
// re-runs itself in a subprocess and inspects the wreckage from outside.
#[test]
fn resume_after_done_aborts() {
    if env::var_os("WEFT_RESUME_DONE_CHILD").is_some() {
        let stack = OwnedStack::new(64 * 1024).unwrap();
        let co = co!(stack.stack(), || {}).unwrap();
        co.resume();
        assert_eq!(co.status(), CoroStatus::Done);
        co.resume();
        unreachable!("resume of a completed coroutine returned");
    }

    let exe = env::current_exe().unwrap();
    let output = Command::new(exe)
        .args(["--exact", "resume_after_done_aborts"])
        .env("WEFT_RESUME_DONE_CHILD", "1")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("resume of completed coroutine"),
        "missing diagnostic in child stderr: {stderr}"
    );
}

//! P2 (a verified module never hits undefined interpreter behaviour — at
//! worst it traps, it never panics) and P8/S6 (trap context is thread-local:
//! a trap on one thread is invisible to another thread running
//! concurrently).

use std::sync::{Arc, Barrier};
use std::thread;
use viper::reader::parse_module;
use viper::runtime::{push_context, TrapContext};
use viper::verify::verify;
use viper::vm::{Runner, TrapKind};
use viper_support::SourceLoc;

fn run(src: &str) -> Runner {
    // Harmless if another test in this binary already initialized the
    // logger; lets `RUST_LOG=debug cargo test` show the trap-capture trace.
    let _ = env_logger::try_init();
    let module = parse_module(src).expect("parses");
    verify(&module).expect("verifies");
    Runner::with_module(module)
}

/// P2: a verified program that divides by zero traps in a controlled way —
/// `run()` returns an exit code (not a panic) and `last_trap()` reports it.
#[test]
fn division_by_zero_traps_instead_of_panicking() {
    let src = "il 0.2.0\nfunc @main() -> i64 {\nentry:\n    %0 = sdiv i64 1:i64, 0:i64;\n    ret %0;\n}\n";
    let mut runner = run(src);
    let code = runner.run();
    assert_eq!(code, 0, "a trapped run reports exit code 0, like a killed process");
    let trap = runner.last_trap().expect("a trap was recorded");
    assert_eq!(trap.kind, TrapKind::Explicit);
    assert!(trap.message.contains("division by zero"));
}

/// P2: ordinary verified arithmetic runs to completion with the expected
/// exit code and no trap recorded.
#[test]
fn well_typed_arithmetic_runs_without_a_trap() {
    let src = "il 0.2.0\nfunc @main() -> i64 {\nentry:\n    %0 = add i64 20:i64, 22:i64;\n    ret %0;\n}\n";
    let mut runner = run(src);
    assert_eq!(runner.run(), 42);
    assert!(runner.last_trap().is_none());
}

/// P2: overflow in a checked `iadd.ovf` traps rather than silently wrapping.
#[test]
fn checked_add_overflow_traps() {
    let src = "il 0.2.0\nfunc @main() -> i64 {\nentry:\n    %0 = iadd.ovf i32 2147483647:i32, 1:i32;\n    ret %0;\n}\n";
    let mut runner = run(src);
    assert_eq!(runner.run(), 0);
    assert!(runner.last_trap().is_some());
}

/// P8/S6: two threads each push their own trap context; neither thread ever
/// observes the other's context, even when they overlap in time.
#[test]
fn trap_context_is_isolated_per_thread() {
    let barrier = Arc::new(Barrier::new(2));

    let b1 = Arc::clone(&barrier);
    let t1 = thread::spawn(move || {
        let ctx = TrapContext { function: "thread_one".into(), block: "entry".into(), loc: SourceLoc::UNKNOWN };
        let _guard = push_context(ctx.clone());
        b1.wait();
        // however the other thread's context is set up, this thread only
        // ever sees its own.
        assert_eq!(viper::runtime::active_context(), Some(ctx));
    });

    let b2 = Arc::clone(&barrier);
    let t2 = thread::spawn(move || {
        let ctx = TrapContext { function: "thread_two".into(), block: "entry".into(), loc: SourceLoc::UNKNOWN };
        let _guard = push_context(ctx.clone());
        b2.wait();
        assert_eq!(viper::runtime::active_context(), Some(ctx));
    });

    t1.join().unwrap();
    t2.join().unwrap();
}

/// S6: running two independent `Runner`s concurrently, one of which traps,
/// does not affect the other's result.
#[test]
fn concurrent_runners_do_not_cross_contaminate_traps() {
    let ok_src = "il 0.2.0\nfunc @main() -> i64 {\nentry:\n    ret 55:i64;\n}\n";
    let trap_src = "il 0.2.0\nfunc @main() -> i64 {\nentry:\n    %0 = sdiv i64 9:i64, 0:i64;\n    ret %0;\n}\n";

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let src = if i % 2 == 0 { ok_src } else { trap_src };
            thread::spawn(move || {
                let mut runner = run(src);
                let code = runner.run();
                (i % 2 == 0, code, runner.last_trap().is_some())
            })
        })
        .collect();

    for h in handles {
        let (expect_ok, code, trapped) = h.join().unwrap();
        if expect_ok {
            assert_eq!(code, 55);
            assert!(!trapped);
        } else {
            assert_eq!(code, 0);
            assert!(trapped);
        }
    }
}

//! Finalizer guarantees for `ensuring` (S5, §8 property 5): the
//! finalizer runs exactly once regardless of outcome, and a finalizer
//! that itself fails combines with the primary cause via `Cause::both`
//! rather than shadowing it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use fibrous::cause::Cause;
use fibrous::effect::{fail, succeed, sync};
use fibrous::exit::Exit;
use fibrous::runtime::Runtime;

#[test]
fn s5_finalizer_runs_once_on_success() {
    let rt = Runtime::default();
    let ran = Arc::new(AtomicU32::new(0));
    let ran2 = Arc::clone(&ran);

    let program = succeed::<String, i32>(1).ensuring(sync(move |_env| {
        ran2.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(rt.unsafe_run(program), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn s5_finalizer_runs_once_on_typed_failure() {
    let rt = Runtime::default();
    let ran = Arc::new(AtomicU32::new(0));
    let ran2 = Arc::clone(&ran);

    let program = fail::<String, i32>("boom".into()).ensuring(sync(move |_env| {
        ran2.fetch_add(1, Ordering::SeqCst);
    }));

    let exit = rt.safe_run_exit(program);
    assert!(matches!(exit, Exit::Failure(ref e) if e.as_str() == "boom"));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn property5_finalizer_failure_combines_with_primary_cause() {
    let rt = Runtime::default();

    let program = fail::<String, i32>("primary".into()).ensuring(fail::<String, ()>("finalizer".into()));

    let exit = rt.safe_run_exit(
        program.fold_cause(|cause: Cause<String>| succeed(cause.pretty_print()), |v| succeed(format!("{v}"))),
    );
    match exit {
        Exit::Success(rendered) => {
            assert!(rendered.starts_with("Both("));
            assert!(rendered.contains("Fail(primary)"));
            assert!(rendered.contains("Fail(finalizer)"));
        }
        other => panic!("expected a rendered cause, got {other:?}"),
    }
}

#[test]
fn ensuring_runs_the_finalizer_even_when_the_primary_dies() {
    use std::panic::{self, AssertUnwindSafe};

    let rt = Runtime::default();
    let ran = Arc::new(AtomicU32::new(0));
    let ran2 = Arc::clone(&ran);

    let program = sync::<String, i32, _>(|_env| panic!("oops")).ensuring(sync(move |_env| {
        ran2.fetch_add(1, Ordering::SeqCst);
    }));

    // A `Die` cause is outside `safe_run_exit`'s typed `Fail` channel, so
    // observing it this way panics by design (see `Runtime::expect_fail`);
    // catch that panic here purely to assert the finalizer still ran.
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let result = panic::catch_unwind(AssertUnwindSafe(|| rt.safe_run_exit(program)));
    panic::set_hook(hook);

    assert!(result.is_err());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

//! Typed-failure recovery: `or_else`/`retry` identities and scenarios S2,
//! S3 (§8 properties 2, 3).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use fibrous::effect::{fail, succeed, try_sync};
use fibrous::either::Either;
use fibrous::runtime::Runtime;

#[test]
fn s2_or_else_recovers_a_typed_failure() {
    let rt = Runtime::default();
    let recovered = fail::<String, i32>("e".into()).or_else(|| succeed(2));
    assert_eq!(rt.unsafe_run(recovered), 2);
}

#[test]
fn s2_or_else_reports_the_last_failure_via_either() {
    let rt = Runtime::default();
    let both_fail = fail::<String, i32>("a".into()).or_else(|| fail("b".into()));
    assert_eq!(rt.safe_run_either(both_fail), Either::Left("b".to_string()));
}

#[test]
fn or_else_identity_on_success() {
    let rt = Runtime::default();
    let unchanged = succeed::<String, i32>(1).or_else(|| succeed(99));
    assert_eq!(rt.unsafe_run(unchanged), 1);
}

#[test]
fn s3_retry_counts_attempts_until_success() {
    let rt = Runtime::default();
    let count = Arc::new(AtomicU32::new(0));

    let attempt = {
        let count = Arc::clone(&count);
        move || {
            let count = Arc::clone(&count);
            try_sync::<String, i32, _>(move |_env| {
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err("x".into()) } else { Ok(1) }
            })
        }
    };

    let program = fibrous::effect::retry(2, attempt);
    assert_eq!(rt.unsafe_run(program), 1);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn s3_retry_surfaces_the_last_failure_when_exhausted() {
    let rt = Runtime::default();
    let count = Arc::new(AtomicU32::new(0));

    let attempt = {
        let count = Arc::clone(&count);
        move || {
            let count = Arc::clone(&count);
            try_sync::<String, i32, _>(move |_env| {
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err("x".into()) } else { Ok(1) }
            })
        }
    };

    let program = fibrous::effect::retry(1, attempt);
    assert_eq!(rt.safe_run_either(program), Either::Left("x".to_string()));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn retry_zero_is_a_single_attempt() {
    let rt = Runtime::default();
    let program = fibrous::effect::retry(0, || fail::<String, i32>("e".into()));
    assert_eq!(rt.safe_run_either(program), Either::Left("e".to_string()));
}

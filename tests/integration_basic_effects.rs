//! End-to-end scenarios for the core constructors and the functor/monad
//! laws over `map`/`flat_map` (§8 properties 1 and scenario S1).

use fibrous::effect::succeed;
use fibrous::runtime::Runtime;

#[test]
fn s1_map_then_flat_map() {
    let rt = Runtime::default();
    let program = succeed::<String, i32>(1)
        .map(|x| x + 1)
        .flat_map(|x| succeed(x * 2));
    assert_eq!(rt.unsafe_run(program), 4);
}

#[test]
fn map_identity_law() {
    let rt = Runtime::default();
    assert_eq!(rt.unsafe_run(succeed::<String, i32>(7).map(|x| x)), 7);
}

#[test]
fn flat_map_succeed_is_identity() {
    let rt = Runtime::default();
    assert_eq!(rt.unsafe_run(succeed::<String, i32>(7).flat_map(succeed)), 7);
}

#[test]
fn left_identity_law() {
    let rt = Runtime::default();
    let k = |x: i32| succeed::<String, i32>(x * 3);
    assert_eq!(rt.unsafe_run(succeed::<String, i32>(5).flat_map(k)), 15);
}

#[test]
fn associativity_law() {
    let rt = Runtime::default();
    let k = |x: i32| succeed::<String, i32>(x + 1);
    let h = |x: i32| succeed::<String, i32>(x * 2);

    let left = succeed::<String, i32>(1).flat_map(k).flat_map(h);
    let right = succeed::<String, i32>(1).flat_map(move |x| k(x).flat_map(h));

    assert_eq!(rt.unsafe_run(left), rt.unsafe_run(right));
}

#[test]
fn unit_discards_the_value() {
    let rt = Runtime::default();
    assert_eq!(rt.unsafe_run(succeed::<String, i32>(1).unit()), ());
}

#[test]
fn as_value_replaces_the_success() {
    let rt = Runtime::default();
    assert_eq!(rt.unsafe_run(succeed::<String, i32>(1).as_value("done")), "done");
}

//! Surface operators, all defined by desugaring to the primitive set in
//! [`super::Repr`].

use std::sync::Arc;
use std::time::Duration;

use super::{AsyncCompleter, Cont, Effect, Erased, ErrCont, Repr, succeed, unerase};
use crate::cause::{Cause, Defect};
use crate::either::Either;
use crate::environment::Environment;
use crate::runtime_error::RuntimeError;

impl<E, A> Effect<E, A>
where
    E: Send + 'static,
    A: Send + 'static,
{
    /// `flatMap(k)`: run `self`, then continue with `k(value)`.
    pub fn flat_map<B, F>(self, k: F) -> Effect<E, B>
    where
        F: FnOnce(A) -> Effect<E, B> + Send + 'static,
        B: Send + 'static,
    {
        let cont: Cont<E> = Box::new(move |erased: Erased| k(unerase::<A>(erased)).into_repr());
        Effect::from_repr(Repr::FlatMap(Box::new(self.into_repr()), cont))
    }

    /// `map(k) = flatMap(a -> succeed(k(a)))`.
    pub fn map<B, F>(self, k: F) -> Effect<E, B>
    where
        F: FnOnce(A) -> B + Send + 'static,
        B: Send + 'static,
    {
        self.flat_map(move |a| succeed(k(a)))
    }

    /// Replace the success value, discarding the original.
    pub fn as_value<B: Send + 'static>(self, value: B) -> Effect<E, B> {
        self.map(move |_| value)
    }

    /// Discard the success value.
    pub fn unit(self) -> Effect<E, ()> {
        self.map(|_| ())
    }

    /// `foldM(onErr, onOk)`: dispatch to `onOk` on success; on a failure
    /// whose cause is a direct typed `Fail`, dispatch to `onErr` with
    /// that error. A `Die` or `Interrupt` (or a composite cause from a
    /// race/ensuring) bypasses `onErr` and propagates unchanged — this is
    /// structural, enforced by `Repr::FoldM`'s interpreter rule, not a
    /// policy check here.
    pub fn fold_m<B, OnErr, OnOk>(self, on_err: OnErr, on_ok: OnOk) -> Effect<E, B>
    where
        OnErr: FnOnce(E) -> Effect<E, B> + Send + 'static,
        OnOk: FnOnce(A) -> Effect<E, B> + Send + 'static,
        B: Send + 'static,
    {
        let err_cont: ErrCont<E> = Box::new(move |e| on_err(e).into_repr());
        let ok_cont: Cont<E> = Box::new(move |erased| on_ok(unerase::<A>(erased)).into_repr());
        Effect::from_repr(Repr::FoldM(Box::new(self.into_repr()), err_cont, ok_cont))
    }

    /// Pure (non-effectful) variant of [`Self::fold_m`].
    pub fn fold<B, OnErr, OnOk>(self, on_err: OnErr, on_ok: OnOk) -> Effect<E, B>
    where
        OnErr: FnOnce(E) -> B + Send + 'static,
        OnOk: FnOnce(A) -> B + Send + 'static,
        B: Send + 'static,
    {
        self.fold_m(move |e| succeed(on_err(e)), move |a| succeed(on_ok(a)))
    }

    /// `orElse(that) = foldM(_ -> that, a -> succeed(a))`. Only triggers
    /// on a typed `Fail`; a `Die` or `Interrupt` propagates unchanged.
    pub fn or_else<F>(self, that: F) -> Effect<E, A>
    where
        F: FnOnce() -> Effect<E, A> + Send + 'static,
    {
        self.fold_m(move |_e| that(), succeed)
    }

    /// `mapError(k)`: translate every `Fail` leaf reachable from `self`
    /// with `k`, leaving its shape and any `Die`/`Interrupt` leaves
    /// untouched. `k` is a `Fn`, not `FnOnce`, because a single failure
    /// site in a raced or forked subtree may need to be translated more
    /// than once.
    pub fn map_error<E2, F>(self, k: F) -> Effect<E2, A>
    where
        F: Fn(E) -> E2 + Send + Sync + 'static,
        E: Clone,
        E2: Send + 'static,
    {
        Effect::from_repr(retarget(self.into_repr(), Arc::new(k)))
    }

    /// `mapBoth(onErr, onOk)`.
    pub fn map_both<E2, B, OnErr, OnOk>(self, on_err: OnErr, on_ok: OnOk) -> Effect<E2, B>
    where
        OnErr: Fn(E) -> E2 + Send + Sync + 'static,
        OnOk: FnOnce(A) -> B + Send + 'static,
        E: Clone,
        E2: Send + 'static,
        B: Send + 'static,
    {
        self.map_error(on_err).map(on_ok)
    }

    /// Widen the error type without changing behavior on success.
    pub fn augment_error<E2, F>(self, k: F) -> Effect<E2, A>
    where
        F: Fn(E) -> E2 + Send + Sync + 'static,
        E: Clone,
        E2: Send + 'static,
    {
        self.map_error(k)
    }

    /// `flatMapError(k)`: like `mapError`, but `k` returns a new effect to
    /// run instead of the failure.
    pub fn flat_map_error<F>(self, k: F) -> Effect<E, A>
    where
        F: FnOnce(E) -> Effect<E, A> + Send + 'static,
    {
        self.fold_m(k, succeed)
    }

    /// Swap success and error channels.
    pub fn flip(self) -> Effect<A, E> {
        self.fold_m(
            |e| succeed::<A, E>(e),
            |a| Effect::from_repr(Repr::Fail(a)),
        )
    }

    /// Swap success and error channels, then run `k` on the swapped value.
    pub fn flip_with<E2, B, F>(self, k: F) -> Effect<E2, B>
    where
        F: FnOnce(Effect<A, E>) -> Effect<E2, B> + Send + 'static,
    {
        k(self.flip())
    }

    /// `tap(k)`: run `k` for its effect, but yield the original value.
    pub fn tap<F>(self, k: F) -> Effect<E, A>
    where
        F: FnOnce(&A) -> Effect<E, ()> + Send + 'static,
        A: Clone,
    {
        self.flat_map(move |a| {
            let eff = k(&a);
            eff.map(move |_| a)
        })
    }

    /// `tapError(k)`: run `k` on a typed failure for its effect, then
    /// re-raise the original error.
    pub fn tap_error<F>(self, k: F) -> Effect<E, A>
    where
        F: FnOnce(&E) -> Effect<E, ()> + Send + 'static,
        E: Clone,
    {
        self.fold_m(
            move |e| {
                let eff = k(&e);
                eff.flat_map(move |_| Effect::from_repr(Repr::Fail(e)))
            },
            succeed,
        )
    }

    /// `tapBoth(onErr, onOk)`.
    pub fn tap_both<OnErr, OnOk>(self, on_err: OnErr, on_ok: OnOk) -> Effect<E, A>
    where
        OnErr: FnOnce(&E) -> Effect<E, ()> + Send + 'static,
        OnOk: FnOnce(&A) -> Effect<E, ()> + Send + 'static,
        E: Clone,
        A: Clone,
    {
        self.tap(on_ok).tap_error(on_err)
    }

    /// `delay(duration) = sleep(duration).flatMap(|_| self)`.
    pub fn delay(self, duration: Duration) -> Effect<E, A> {
        super::sleep(duration).flat_map(move |_| self)
    }

    /// Guarantee `finalizer` runs exactly once after `self`, uninterruptibly,
    /// regardless of `self`'s outcome. When both fail, the two causes
    /// combine via `Cause::both` rather than one shadowing the other.
    pub fn ensuring(self, finalizer: Effect<E, ()>) -> Effect<E, A> {
        Effect::from_repr(Repr::Ensuring(
            Box::new(self.into_repr()),
            Box::new(finalizer.into_repr()),
        ))
    }

    /// `timeout(duration) = raceFirst(self.map(Some), sleep(duration).as(None))`.
    pub fn timeout(self, duration: Duration) -> Effect<E, Option<A>>
    where
        E: Clone,
    {
        let timed_out: Effect<E, Option<A>> = super::sleep(duration).map(|_| None);
        let completed: Effect<E, Option<A>> = self.map(Some);
        super::race_first(vec![completed, timed_out])
    }

    /// `zip(that)`: run both concurrently, pairing the successes.
    pub fn zip<B>(self, that: Effect<E, B>) -> Effect<E, (A, B)>
    where
        B: Send + 'static,
        E: Clone,
    {
        self.zip_with(that, |a, b| (a, b))
    }

    pub fn zip_left<B>(self, that: Effect<E, B>) -> Effect<E, A>
    where
        B: Send + 'static,
        E: Clone,
    {
        self.zip_with(that, |a, _| a)
    }

    pub fn zip_right<B>(self, that: Effect<E, B>) -> Effect<E, B>
    where
        B: Send + 'static,
        E: Clone,
    {
        self.zip_with(that, |_, b| b)
    }

    /// `foldCause(onCause, onOk)`: like [`Self::fold_m`], but `onCause`
    /// receives the whole `Cause<E>` rather than only a recoverable
    /// `Fail` — the extension point `foldM` deliberately doesn't offer,
    /// since `foldM` exists specifically to let `Die`/`Interrupt` bypass
    /// ordinary error handling.
    pub fn fold_cause<B, OnCause, OnOk>(self, on_cause: OnCause, on_ok: OnOk) -> Effect<E, B>
    where
        OnCause: FnOnce(Cause<E>) -> Effect<E, B> + Send + 'static,
        OnOk: FnOnce(A) -> Effect<E, B> + Send + 'static,
        E: Clone,
        B: Send + 'static,
    {
        let repr = self.into_repr();
        super::async_effect(move |env, completer| {
            let env_for_source = env.clone();
            let env_for_next = env.clone();
            let (_source_ctx, rx) = crate::interpreter::spawn_fiber(repr, env_for_source);
            env.scheduler()
                .executor()
                .spawn(async move {
                    let next: Effect<E, B> = match rx.recv().await {
                        Ok(Ok(value)) => on_ok(unerase::<A>(value)),
                        Ok(Err(cause)) => on_cause(cause),
                        Err(_) => on_cause(Cause::die(Defect::new(
                            RuntimeError::FiberDisappeared { during: "foldCause:source" },
                        ))),
                    };
                    let (_next_ctx, next_rx) =
                        crate::interpreter::spawn_fiber(next.into_repr(), env_for_next);
                    match next_rx.recv().await {
                        Ok(Ok(value)) => completer.resolve_erased(value),
                        Ok(Err(cause)) => completer.reject_cause(cause),
                        Err(_) => completer.reject_cause(Cause::die(Defect::new(
                            RuntimeError::FiberDisappeared { during: "foldCause:continuation" },
                        ))),
                    }
                })
                .detach();
        })
    }

    /// `zipWith(that, f)`: fork `self` so it runs concurrently with
    /// `that`, then join it and combine the two successes with `f`. A
    /// failure in either aborts the other via the same interruption path
    /// `race`/`all` use.
    pub fn zip_with<B, C, F>(self, that: Effect<E, B>, f: F) -> Effect<E, C>
    where
        B: Send + 'static,
        C: Send + 'static,
        F: FnOnce(A, B) -> C + Send + 'static,
        E: Clone,
    {
        super::fork(self).flat_map(move |handle| {
            that.flat_map(move |b| handle.join().map(move |a| f(a, b)))
        })
    }
}

impl<E, A> Effect<E, Effect<E, A>>
where
    E: Send + 'static,
    A: Send + 'static,
{
    /// `flatten`: run the outer effect, then the inner effect it yields.
    pub fn flatten(self) -> Effect<E, A> {
        self.flat_map(|inner| inner)
    }
}

impl<E, A> Effect<E, Either<E, A>>
where
    E: Send + 'static,
    A: Send + 'static,
{
    /// `absolve`: lift an inner `Either<E, A>` success value into the
    /// effect's own error/success channels — `Left(e)` becomes a typed
    /// failure, `Right(a)` a success.
    pub fn absolve(self) -> Effect<E, A> {
        self.flat_map(|either| match either {
            Either::Left(e) => Effect::from_repr(Repr::Fail(e)),
            Either::Right(a) => succeed(a),
        })
    }
}

/// `retry(attempts, make)`: call `make()` for a fresh attempt; on a typed
/// failure, retry up to `attempts` more times before letting the last
/// failure surface. `make` is a `Fn`, not `FnOnce`, since it may be
/// invoked more than once.
pub fn retry<E, A, F>(attempts: u32, make: F) -> Effect<E, A>
where
    E: Send + 'static,
    A: Send + 'static,
    F: Fn() -> Effect<E, A> + Send + Sync + 'static,
{
    retry_loop(attempts, Arc::new(make))
}

fn retry_loop<E, A, F>(attempts: u32, make: Arc<F>) -> Effect<E, A>
where
    E: Send + 'static,
    A: Send + 'static,
    F: Fn() -> Effect<E, A> + Send + Sync + 'static,
{
    let attempt = make();
    if attempts == 0 {
        attempt
    } else {
        let again = Arc::clone(&make);
        attempt.or_else(move || retry_loop(attempts - 1, again))
    }
}

/// Translate every `Fail` leaf in `repr` through `k`, leaving its shape
/// and any `Die`/`Interrupt` leaves alone. Every primitive except
/// `FoldM` can be retargeted by straightforward structural recursion;
/// `FoldM`'s own continuations need to run under the *native* `E` before
/// any translation happens (they pattern-match on it), so that one node
/// is forked into a background fiber, evaluated to completion under `E`,
/// and only then bridged into `E2` through an `Async` registration.
pub(crate) fn retarget<E, E2, F>(repr: Repr<E>, k: Arc<F>) -> Repr<E2>
where
    E: Clone + Send + 'static,
    E2: Send + 'static,
    F: Fn(E) -> E2 + Send + Sync + 'static,
{
    match repr {
        Repr::Succeed(a) => Repr::Succeed(a),
        Repr::Fail(e) => Repr::Fail(k(e)),

        Repr::Sync(thunk) => {
            let k = Arc::clone(&k);
            Repr::Sync(Box::new(move |env| {
                thunk(env).map_err(|cause| cause.map(&mut |e| (*k)(e)))
            }))
        }

        Repr::Async(register) => {
            let k = Arc::clone(&k);
            Repr::Async(Box::new(move |env: &Environment, completer2: AsyncCompleter<E2>| {
                let (tx1, rx1) = smol::channel::bounded(1);
                register(env, AsyncCompleter::new(tx1));
                let env_owned = env.clone();
                env_owned
                    .scheduler()
                    .executor()
                    .spawn(async move {
                        match rx1.recv().await {
                            Ok(Ok(value)) => completer2.resolve_erased(value),
                            Ok(Err(cause)) => {
                                completer2.reject_cause(cause.map(&mut |e| (*k)(e)))
                            }
                            Err(_) => completer2.reject_cause(Cause::die(Defect::new(
                                RuntimeError::AsyncCompleterDropped,
                            ))),
                        }
                    })
                    .detach();
            }))
        }

        Repr::FlatMap(inner, cont) => {
            let k1 = Arc::clone(&k);
            let inner2 = retarget(*inner, Arc::clone(&k));
            let cont2: Cont<E2> = Box::new(move |erased| retarget(cont(erased), k1));
            Repr::FlatMap(Box::new(inner2), cont2)
        }

        Repr::FoldM(inner, err_cont, ok_cont) => {
            let node: Repr<E> = Repr::FoldM(inner, err_cont, ok_cont);
            let k = Arc::clone(&k);
            Repr::Async(Box::new(move |env: &Environment, completer2: AsyncCompleter<E2>| {
                let env_owned = env.clone();
                let (_ctx, rx) = crate::interpreter::spawn_fiber(node, env_owned.clone());
                env_owned
                    .scheduler()
                    .executor()
                    .spawn(async move {
                        match rx.recv().await {
                            Ok(Ok(value)) => completer2.resolve_erased(value),
                            Ok(Err(cause)) => {
                                completer2.reject_cause(cause.map(&mut |e| (*k)(e)))
                            }
                            Err(_) => completer2.reject_cause(Cause::die(Defect::new(
                                RuntimeError::FiberDisappeared { during: "mapError" },
                            ))),
                        }
                    })
                    .detach();
            }))
        }

        Repr::Race(children) => Repr::Race(
            children
                .into_iter()
                .map(|c| retarget(c, Arc::clone(&k)))
                .collect(),
        ),
        Repr::RaceFirst(children) => Repr::RaceFirst(
            children
                .into_iter()
                .map(|c| retarget(c, Arc::clone(&k)))
                .collect(),
        ),
        Repr::All(children) => Repr::All(
            children
                .into_iter()
                .map(|c| retarget(c, Arc::clone(&k)))
                .collect(),
        ),

        Repr::Ensuring(body, finalizer) => Repr::Ensuring(
            Box::new(retarget(*body, Arc::clone(&k))),
            Box::new(retarget(*finalizer, k)),
        ),

        Repr::Sleep(duration) => Repr::Sleep(duration),

        Repr::Fork(body) => Repr::Fork(Box::new(retarget(*body, k))),

        Repr::SetInterruptible(body, flag) => {
            Repr::SetInterruptible(Box::new(retarget(*body, k)), flag)
        }

        Repr::CheckInterrupt => Repr::CheckInterrupt,
    }
}

#[cfg(test)]
mod tests {
    use super::super::{fail, succeed};
    use crate::runtime::Runtime;

    #[test]
    fn map_and_flat_map_compose() {
        let rt = Runtime::default();
        let eff = succeed::<String, i32>(1)
            .map(|x| x + 1)
            .flat_map(|x| succeed(x * 2));
        assert_eq!(rt.unsafe_run(eff), 4);
    }

    #[test]
    fn or_else_only_triggers_on_fail() {
        let rt = Runtime::default();
        let a = fail::<&str, i32>("e").or_else(|| succeed(2));
        assert_eq!(rt.unsafe_run(a), 2);

        let b = succeed::<&str, i32>(1).or_else(|| succeed(99));
        assert_eq!(rt.unsafe_run(b), 1);
    }

    #[test]
    fn retry_counts_attempts() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let rt = Runtime::default();
        let count = Arc::new(AtomicU32::new(0));
        let eff = super::retry(2, {
            let count = Arc::clone(&count);
            move || {
                let count = Arc::clone(&count);
                crate::effect::try_sync::<&str, i32, _>(move |_env| {
                    let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err("x") } else { Ok(1) }
                })
            }
        });
        assert_eq!(rt.unsafe_run(eff), 1);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn map_error_translates_fail_leaves_only() {
        let rt = crate::runtime::Runtime::default();
        let eff = fail::<&str, i32>("boom").map_error(|e| format!("wrapped: {e}"));
        let result = rt.safe_run_either(eff);
        assert_eq!(
            result,
            crate::either::Either::Left("wrapped: boom".to_string())
        );
    }

    #[test]
    fn zip_with_combines_concurrently() {
        let rt = Runtime::default();
        let eff = succeed::<&str, i32>(1).zip_with(succeed(2), |a, b| a + b);
        assert_eq!(rt.unsafe_run(eff), 3);
    }
}

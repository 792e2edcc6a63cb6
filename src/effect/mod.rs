//! The effect algebra: an immutable value that *describes* a computation
//! without running it.
//!
//! `Effect<E, A>` is a thin, statically-typed handle around an erased
//! primitive tree (`Repr<E>`). Every composite primitive (`FlatMap`,
//! `FoldM`, `All`, ...) stores its children and continuations with their
//! intermediate success values erased to `Box<dyn Any + Send>`; the typed
//! smart constructors in this module and in [`combinators`]/[`fiber_ops`]
//! are the only places that box and downcast, so a caller never sees an
//! `Any` anywhere in the public API. This is the "universal erased
//! representation" option for porting a dynamically-typed effect tree into
//! a statically-typed host language — see `DESIGN.md`.
//!
//! `E` is required to be `Clone` throughout the public surface: a cause
//! broadcast to several observers at once (a racing sibling, an
//! `ensuring` finalizer, a concurrent status query) needs its own owned
//! copy, and threading an erasure-friendly sharing scheme through every
//! primitive for a case that real error types virtually always satisfy
//! anyway isn't worth the complexity. Success values carry no such bound.

mod combinators;
mod fiber_ops;

use std::any::Any;
use std::marker::PhantomData;
use std::time::Duration;

use crate::cause::Cause;
use crate::environment::Environment;

pub use combinators::retry;
pub use fiber_ops::{
    FiberHandle, all, await_fiber, fiber_status, fork, fork_all, interrupt_fiber, race,
    race_first,
};

/// The type-erased value flowing across a `FlatMap`/`FoldM`/`All` boundary.
pub(crate) type Erased = Box<dyn Any + Send>;

pub(crate) fn erase<T: Send + 'static>(value: T) -> Erased {
    Box::new(value)
}

pub(crate) fn unerase<T: Send + 'static>(value: Erased) -> T {
    *value
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("effect type discipline violated: unerase mismatch"))
}

pub(crate) type Cont<E> = Box<dyn FnOnce(Erased) -> Repr<E> + Send>;
pub(crate) type ErrCont<E> = Box<dyn FnOnce(E) -> Repr<E> + Send>;
pub(crate) type SyncThunk<E> = Box<dyn FnOnce(&Environment) -> Result<Erased, Cause<E>> + Send>;
pub(crate) type AsyncRegister<E> = Box<dyn FnOnce(&Environment, AsyncCompleter<E>) + Send>;

/// Passed to an `Async` registration callback. `resolve`/`reject` may be
/// called from any thread (e.g. a timer or I/O completion callback); only
/// the first call of either takes effect.
pub struct AsyncCompleter<E> {
    sender: std::sync::Arc<std::sync::Mutex<Option<smol::channel::Sender<Result<Erased, Cause<E>>>>>>,
}

impl<E> AsyncCompleter<E> {
    pub(crate) fn new(sender: smol::channel::Sender<Result<Erased, Cause<E>>>) -> Self {
        Self {
            sender: std::sync::Arc::new(std::sync::Mutex::new(Some(sender))),
        }
    }

    fn complete(&self, outcome: Result<Erased, Cause<E>>) {
        if let Some(sender) = self.sender.lock().unwrap().take() {
            let _ = sender.try_send(outcome);
        }
    }

    pub fn resolve<A: Send + 'static>(&self, value: A) {
        self.complete(Ok(erase(value)));
    }

    pub fn reject(&self, error: E) {
        self.complete(Err(Cause::fail(error)));
    }

    /// Like [`Self::resolve`], but the value is already erased. Used
    /// internally when bridging one effect evaluation into another's
    /// `Async` registration (error retargeting, fiber joins).
    pub(crate) fn resolve_erased(&self, value: Erased) {
        self.complete(Ok(value));
    }

    /// Like [`Self::reject`], but takes a ready-made cause rather than
    /// building a `Cause::Fail` from a bare error.
    pub(crate) fn reject_cause(&self, cause: Cause<E>) {
        self.complete(Err(cause));
    }
}

impl<E> Clone for AsyncCompleter<E> {
    fn clone(&self) -> Self {
        Self {
            sender: std::sync::Arc::clone(&self.sender),
        }
    }
}

/// The primitive node set. `Repr<E>` is generic only over the error type:
/// every node's success value, and every continuation's input value, is
/// erased to `Erased`.
pub(crate) enum Repr<E> {
    Succeed(Erased),
    Fail(E),
    Sync(SyncThunk<E>),
    Async(AsyncRegister<E>),
    FlatMap(Box<Repr<E>>, Cont<E>),
    FoldM(Box<Repr<E>>, ErrCont<E>, Cont<E>),
    Race(Vec<Repr<E>>),
    RaceFirst(Vec<Repr<E>>),
    All(Vec<Repr<E>>),
    Ensuring(Box<Repr<E>>, Box<Repr<E>>),
    Sleep(Duration),
    Fork(Box<Repr<E>>),
    SetInterruptible(Box<Repr<E>>, bool),
    CheckInterrupt,
}

/// An immutable description of a computation that requires an
/// [`Environment`], may fail with `E`, and on success yields an `A`.
///
/// Building an `Effect` performs no work; only `Runtime::unsafe_run` (and
/// its `safe_run_*` siblings) interpret it.
pub struct Effect<E, A> {
    pub(crate) repr: Repr<E>,
    _marker: PhantomData<fn() -> A>,
}

impl<E, A> Effect<E, A> {
    pub(crate) fn from_repr(repr: Repr<E>) -> Self {
        Self {
            repr,
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_repr(self) -> Repr<E> {
        self.repr
    }
}

/// Yield `a` immediately, without touching the environment.
pub fn succeed<E, A: Send + 'static>(a: A) -> Effect<E, A> {
    Effect::from_repr(Repr::Succeed(erase(a)))
}

/// Fail with the typed error `e`.
pub fn fail<E, A>(e: E) -> Effect<E, A> {
    Effect::from_repr(Repr::Fail(e))
}

/// Run `f` for its side effect / return value; a panic inside `f` is
/// caught at the interpreter boundary and becomes `Cause::Die`, never a
/// typed `Fail`.
pub fn sync<E, A, F>(f: F) -> Effect<E, A>
where
    F: FnOnce(&Environment) -> A + Send + 'static,
    A: Send + 'static,
{
    Effect::from_repr(Repr::Sync(Box::new(move |env| Ok(erase(f(env))))))
}

/// Like [`sync`], but `f` returns a `Result<A, E>` directly, so a typed
/// failure doesn't need to round-trip through a panic.
pub fn try_sync<E, A, F>(f: F) -> Effect<E, A>
where
    F: FnOnce(&Environment) -> Result<A, E> + Send + 'static,
    A: Send + 'static,
{
    Effect::from_repr(Repr::Sync(Box::new(move |env| match f(env) {
        Ok(a) => Ok(erase(a)),
        Err(e) => Err(Cause::fail(e)),
    })))
}

/// Suspend the current fiber; `register` is invoked exactly once with a
/// completer whose `resolve`/`reject` methods resume the fiber. Only the
/// first call across both methods (and across repeated calls to either)
/// has any effect.
pub fn async_effect<E, A, F>(register: F) -> Effect<E, A>
where
    F: FnOnce(&Environment, AsyncCompleter<E>) + Send + 'static,
    A: Send + 'static,
{
    Effect::from_repr(Repr::Async(Box::new(register)))
}

/// Cooperative delay of at least `duration`.
pub fn sleep<E>(duration: Duration) -> Effect<E, ()> {
    Effect::from_repr(Repr::Sleep(duration))
}

/// `CheckInterrupt`: a cooperative safe point. Fails with
/// `Cause::Interrupt` if the running fiber has been asked to interrupt
/// and is currently interruptible; otherwise a no-op success. This is
/// the *only* point at which a fiber observes its own interruption —
/// nothing else in the interpreter inserts an implicit check.
pub fn check_interrupt<E>() -> Effect<E, ()> {
    Effect::from_repr(Repr::CheckInterrupt)
}

/// Lift an already-computed `Either` into the error/success channels.
pub fn from_either<E, A>(either: crate::either::Either<E, A>) -> Effect<E, A>
where
    E: Send + 'static,
    A: Send + 'static,
{
    match either {
        crate::either::Either::Left(e) => fail(e),
        crate::either::Either::Right(a) => succeed(a),
    }
}

/// Adapt a host `Future<Output = Result<A, E>>` (e.g. a `smol`-driven I/O
/// call) into an effect: the future is polled to completion on the
/// ambient scheduler, and its result resolves or rejects the fiber that
/// awaits this effect.
pub fn from_future<E, A, F>(future: F) -> Effect<E, A>
where
    F: std::future::Future<Output = Result<A, E>> + Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
{
    async_effect(move |env, completer| {
        env.scheduler()
            .executor()
            .spawn(async move {
                match future.await {
                    Ok(a) => completer.resolve(a),
                    Err(e) => completer.reject(e),
                }
            })
            .detach();
    })
}

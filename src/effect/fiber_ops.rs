//! Forking, joining, and racing — the library functions built on top of
//! the `Fork`/`Race`/`RaceFirst`/`All` primitives and a live
//! [`FiberContext`].
//!
//! `join`/`await_fiber`/`interrupt_fiber`/`fiber_status` deliberately
//! aren't dedicated `Repr` variants: each only needs to reference a
//! fiber that's already running, so they're ordinary `async_effect`-based
//! functions rather than new interpreter machinery.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::cause::{Cause, Defect};
use crate::fiber::{FiberContext, FiberExit, RunState};
use crate::interpreter::RawFiberHandle;
use crate::runtime_error::RuntimeError;

use super::{Effect, Erased, Repr, erase, unerase};

/// A live handle to a forked fiber, returned by [`fork`]. Joining consumes
/// it; every other operation borrows it by reference and can be called
/// any number of times.
pub struct FiberHandle<E, A> {
    context: Arc<FiberContext<E>>,
    result: Arc<Mutex<Option<smol::channel::Receiver<Result<Erased, Cause<E>>>>>>,
    _marker: PhantomData<fn() -> A>,
}

impl<E, A> Clone for FiberHandle<E, A> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            result: Arc::clone(&self.result),
            _marker: PhantomData,
        }
    }
}

impl<E, A> FiberHandle<E, A>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    fn from_raw(raw: RawFiberHandle<E>) -> Self {
        Self {
            context: raw.context,
            result: Arc::new(Mutex::new(Some(raw.result))),
            _marker: PhantomData,
        }
    }

    /// Suspend until the fiber completes, yielding its success value or
    /// propagating its failure cause. A fiber can only ever be joined
    /// once: the receiving end of its result channel is consumed by the
    /// first join, so a second call dies with a defect rather than
    /// hanging forever.
    pub fn join(&self) -> Effect<E, A> {
        let slot = Arc::clone(&self.result);
        super::async_effect(move |env, completer| {
            let receiver = slot.lock().unwrap().take();
            let Some(receiver) = receiver else {
                completer.reject_cause(Cause::die(Defect::new(RuntimeError::FiberAlreadyJoined)));
                return;
            };
            env.scheduler()
                .executor()
                .spawn(async move {
                    match receiver.recv().await {
                        Ok(Ok(value)) => completer.resolve_erased(value),
                        Ok(Err(cause)) => completer.reject_cause(cause),
                        Err(_) => completer.reject_cause(Cause::die(Defect::new(
                            RuntimeError::FiberDisappeared { during: "join" },
                        ))),
                    }
                })
                .detach();
        })
    }

    /// Request interruption. Idempotent; a no-op if the fiber has already
    /// finished.
    pub fn interrupt(&self) -> Effect<E, ()> {
        let context = Arc::clone(&self.context);
        super::sync(move |_env| {
            context.interrupt();
        })
    }

    /// A point-in-time snapshot of the fiber's lifecycle, with no failure
    /// detail — use [`Self::join`] to observe how it failed.
    pub fn status(&self) -> Effect<E, RunState> {
        let context = Arc::clone(&self.context);
        super::sync(move |_env| context.status().run_state())
    }

    /// Suspend until the fiber completes, yielding its [`FiberExit`] as a
    /// success value whether the fiber succeeded or failed. Unlike
    /// [`Self::join`], this never propagates the child's failure to the
    /// caller — the observer decides what to do with it. Consumes the
    /// result channel the same way `join` does, so a fiber can only be
    /// awaited or joined once, whichever comes first.
    pub fn await_exit(&self) -> Effect<E, FiberExit<E, A>> {
        let slot = Arc::clone(&self.result);
        super::async_effect(move |env, completer| {
            let receiver = slot.lock().unwrap().take();
            let Some(receiver) = receiver else {
                completer.reject_cause(Cause::die(Defect::new(RuntimeError::FiberAlreadyJoined)));
                return;
            };
            env.scheduler()
                .executor()
                .spawn(async move {
                    let exit = match receiver.recv().await {
                        Ok(Ok(value)) => FiberExit::Success(unerase::<A>(value)),
                        Ok(Err(cause)) => FiberExit::Failure(cause),
                        Err(_) => FiberExit::Failure(Cause::die(Defect::new(
                            RuntimeError::FiberDisappeared { during: "await" },
                        ))),
                    };
                    completer.resolve(exit);
                })
                .detach();
        })
    }
}

/// Start `effect` running concurrently on the ambient scheduler,
/// returning immediately with a handle. The child keeps running even if
/// the handle is dropped without being joined.
pub fn fork<E, A>(effect: Effect<E, A>) -> Effect<E, FiberHandle<E, A>>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    let repr = Repr::Fork(Box::new(effect.into_repr()));
    // `Repr::Fork` resolves to an erased `RawFiberHandle<E>`; rewrap it
    // here with the caller's concrete `A`.
    Effect::from_repr(Repr::FlatMap(
        Box::new(repr),
        Box::new(|erased: Erased| {
            let raw: RawFiberHandle<E> = unerase(erased);
            Repr::Succeed(erase(FiberHandle::<E, A>::from_raw(raw)))
        }),
    ))
}

/// Wait for the fiber and yield its [`FiberExit`] as a success value.
/// Unlike [`FiberHandle::join`], this never propagates the child's
/// failure — the caller observes it as data instead.
pub fn await_fiber<E, A>(handle: &FiberHandle<E, A>) -> Effect<E, FiberExit<E, A>>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    handle.await_exit()
}

/// Request interruption, then wait for the fiber's [`FiberExit`] the same
/// way [`await_fiber`] does. Never propagates the child's failure.
pub fn interrupt_fiber<E, A>(handle: &FiberHandle<E, A>) -> Effect<E, FiberExit<E, A>>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    let handle = handle.clone();
    handle.interrupt().flat_map(move |_| handle.await_exit())
}

pub fn fiber_status<E, A>(handle: &FiberHandle<E, A>) -> Effect<E, RunState>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    handle.status()
}

/// Fork every effect, collecting their handles without waiting for any
/// of them to complete.
pub fn fork_all<E, A>(effects: Vec<Effect<E, A>>) -> Effect<E, Vec<FiberHandle<E, A>>>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    all(effects.into_iter().map(fork).collect())
}

/// Run every effect concurrently, collecting their results in the same
/// order they were given. The first failure interrupts every sibling;
/// if more than one child fails, their causes are combined with
/// [`Cause::both`].
pub fn all<E, A>(effects: Vec<Effect<E, A>>) -> Effect<E, Vec<A>>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    let children: Vec<Repr<E>> = effects.into_iter().map(Effect::into_repr).collect();
    Effect::from_repr(Repr::FlatMap(
        Box::new(Repr::All(children)),
        Box::new(|erased: Erased| {
            let values: Vec<Erased> = unerase(erased);
            let typed: Vec<A> = values.into_iter().map(unerase).collect();
            Repr::Succeed(erase(typed))
        }),
    ))
}

/// Run every effect concurrently; succeed with the first to succeed,
/// interrupting the rest. Fails only once every participant has failed,
/// combining their causes with [`Cause::both`].
pub fn race<E, A>(effects: Vec<Effect<E, A>>) -> Effect<E, A>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    let children: Vec<Repr<E>> = effects.into_iter().map(Effect::into_repr).collect();
    Effect::from_repr(Repr::FlatMap(
        Box::new(Repr::Race(children)),
        Box::new(|erased: Erased| Repr::Succeed(erase(unerase::<A>(erased)))),
    ))
}

/// Run every effect concurrently; resolve on whichever finishes first,
/// success or failure, interrupting the rest. The building block for
/// `timeout`: race a real effect against a `sleep`-based fallback.
pub fn race_first<E, A>(effects: Vec<Effect<E, A>>) -> Effect<E, A>
where
    E: Clone + Send + 'static,
    A: Send + 'static,
{
    let children: Vec<Repr<E>> = effects.into_iter().map(Effect::into_repr).collect();
    Effect::from_repr(Repr::FlatMap(
        Box::new(Repr::RaceFirst(children)),
        Box::new(|erased: Erased| Repr::Succeed(erase(unerase::<A>(erased)))),
    ))
}

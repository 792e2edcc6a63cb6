//! `FiberContext`: the mutable per-fiber bookkeeping touched by the
//! interpreter — identity, lifecycle, and interruption.
//!
//! Every field here is only ever mutated by the scheduler's single
//! logical driving loop (see `interpreter`); the `Mutex` exists solely
//! because the host async executor requires the futures it polls to be
//! `Send`, not because more than one OS thread is ever racing on this
//! state. A fiber's success *value* never lives here — see
//! `effect::fiber_ops` for how it travels from a forked fiber to its
//! joiner.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::cause::Cause;
use crate::fiber::{FiberId, FiberOutcome, FiberStatus};

type Observer<E> = Box<dyn FnOnce(FiberOutcome<E>) + Send>;

struct Observers<E> {
    next_token: u64,
    entries: Vec<(u64, Observer<E>)>,
}

impl<E> Observers<E> {
    fn new() -> Self {
        Self {
            next_token: 0,
            entries: Vec::new(),
        }
    }
}

struct Inner<E> {
    status: FiberStatus<E>,
    observers: Observers<E>,
}

/// Per-fiber mutable state. Created when the interpreter enters a `Fork`
/// (or a `Race`/`All` branch); dropped once nothing references it.
pub struct FiberContext<E> {
    id: FiberId,
    inner: Mutex<Inner<E>>,
    interrupted: AtomicBool,
    interruptible: AtomicBool,
    reductions: AtomicU32,
}

/// Returned by [`FiberContext::add_observer`]; removes the observer when
/// invoked or dropped. Calling it, or dropping it, after the fiber has
/// already notified the observer is a no-op.
pub struct Unsubscribe<E> {
    token: Option<u64>,
    fiber: std::sync::Weak<FiberContext<E>>,
}

impl<E> Unsubscribe<E> {
    pub fn call(mut self) {
        self.remove();
    }

    /// Keep the observer registered for the fiber's whole lifetime —
    /// named for intent at call sites that deliberately want a permanent
    /// subscription rather than a revocable one.
    pub fn persist(self) {
        std::mem::forget(self);
    }

    fn remove(&mut self) {
        if let (Some(token), Some(fiber)) = (self.token.take(), self.fiber.upgrade()) {
            let mut inner = fiber.inner.lock().unwrap();
            inner.observers.entries.retain(|(t, _)| *t != token);
        }
    }
}

impl<E> Drop for Unsubscribe<E> {
    fn drop(&mut self) {
        self.remove();
    }
}

impl<E> FiberContext<E> {
    pub fn new(id: FiberId) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            id,
            inner: Mutex::new(Inner {
                status: FiberStatus::Running,
                observers: Observers::new(),
            }),
            interrupted: AtomicBool::new(false),
            interruptible: AtomicBool::new(true),
            reductions: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> FiberId {
        self.id
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().unwrap().status.is_done()
    }

    pub fn mark_suspended(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.status.is_done() {
            inner.status = FiberStatus::Suspended;
        }
    }

    pub fn mark_running(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.status.is_done() {
            inner.status = FiberStatus::Running;
        }
    }

    /// Register `cb` to be invoked exactly once with the fiber's outcome.
    ///
    /// If the fiber is already `Done`, `cb` runs synchronously right here
    /// and the returned [`Unsubscribe`] is already spent. Otherwise `cb`
    /// runs (in registration order, alongside any other observers) the
    /// first time [`FiberContext::done`] is called.
    pub fn add_observer(
        self: &std::sync::Arc<Self>,
        cb: impl FnOnce(FiberOutcome<E>) + Send + 'static,
    ) -> Unsubscribe<E>
    where
        E: Clone,
    {
        let mut inner = self.inner.lock().unwrap();
        if let FiberStatus::Done(outcome) = &inner.status {
            let outcome = outcome.clone();
            drop(inner);
            cb(outcome);
            return Unsubscribe {
                token: None,
                fiber: std::sync::Arc::downgrade(self),
            };
        }
        let token = inner.observers.next_token;
        inner.observers.next_token += 1;
        inner.observers.entries.push((token, Box::new(cb)));
        Unsubscribe {
            token: Some(token),
            fiber: std::sync::Arc::downgrade(self),
        }
    }

    /// Owned snapshot of the current status.
    pub fn status(&self) -> FiberStatus<E>
    where
        E: Clone,
    {
        self.inner.lock().unwrap().status.clone()
    }

    /// Transition to `Done(outcome)` unless already done. Only the first
    /// caller wins; all registered observers are drained and invoked, in
    /// registration order, exactly once.
    pub fn done(&self, outcome: FiberOutcome<E>)
    where
        E: Clone,
    {
        let observers = {
            let mut inner = self.inner.lock().unwrap();
            if inner.status.is_done() {
                return;
            }
            inner.status = FiberStatus::Done(outcome.clone());
            std::mem::take(&mut inner.observers.entries)
        };
        tracing::trace!(fiber = self.id.as_u64(), "fiber done");
        for (_, observer) in observers {
            observer(outcome.clone());
        }
    }

    /// Idempotent. Sets the monotonic `interrupted` flag. If the fiber is
    /// currently interruptible and not yet done, it transitions to
    /// `Done(Failure(Interrupt))` immediately; otherwise the request
    /// latches and is consumed at the next cooperative check point.
    pub fn interrupt(&self)
    where
        E: Clone,
    {
        self.interrupted.store(true, Ordering::SeqCst);
        tracing::trace!(fiber = self.id.as_u64(), "interrupt requested");
        if self.interruptible.load(Ordering::SeqCst) {
            self.done(FiberOutcome::Failure(Cause::interrupt(self.id)));
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_interruptible(&self) -> bool {
        self.interruptible.load(Ordering::SeqCst)
    }

    /// Overrides interruptibility, returning the previous value so callers
    /// can restore it on every exit path (`SetInterruptible`'s contract).
    pub fn set_interruptible(&self, flag: bool) -> bool {
        self.interruptible.swap(flag, Ordering::SeqCst)
    }

    /// `CheckInterrupt`'s primitive: fails with `Interrupt(self)` if the
    /// fiber is both interrupted and currently interruptible.
    pub fn check_interrupt(&self) -> Option<Cause<E>> {
        if self.interrupted.load(Ordering::SeqCst) && self.interruptible.load(Ordering::SeqCst) {
            Some(Cause::interrupt(self.id))
        } else {
            None
        }
    }

    /// Count one synchronous reduction; returns `true` once `budget`
    /// reductions have passed since the last time this returned `true`.
    /// A `budget` of `0` never trips, matching a disabled cooperative-yield
    /// bound.
    pub(crate) fn tick_reduction(&self, budget: u32) -> bool {
        if budget == 0 {
            return false;
        }
        let count = self.reductions.fetch_add(1, Ordering::Relaxed) + 1;
        count % budget == 0
    }
}

impl<E> fmt::Debug for FiberContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberContext")
            .field("id", &self.id)
            .field("interrupted", &self.is_interrupted())
            .field("interruptible", &self.is_interruptible())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::FiberIdAllocator;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn ctx() -> Arc<FiberContext<&'static str>> {
        FiberContext::new(FiberIdAllocator::next())
    }

    #[test]
    fn done_is_idempotent_first_writer_wins() {
        let fiber = ctx();
        fiber.done(FiberOutcome::Failure(Cause::fail("first")));
        fiber.done(FiberOutcome::Failure(Cause::fail("second")));
        match fiber.status() {
            FiberStatus::Done(FiberOutcome::Failure(Cause::Fail(e))) => assert_eq!(e, "first"),
            other => panic!("expected Done(Failure(Fail(\"first\"))), got {other:?}"),
        }
    }

    #[test]
    fn observers_run_once_in_registration_order() {
        let fiber = ctx();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            fiber.add_observer(move |_| order.lock().unwrap().push(tag)).persist();
        }
        fiber.done(FiberOutcome::Success);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn observer_added_after_done_fires_synchronously() {
        let fiber = ctx();
        fiber.done(FiberOutcome::Success);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        fiber
            .add_observer(move |outcome| {
                if outcome.is_success() {
                    seen2.store(1, Ordering::SeqCst);
                }
            })
            .persist();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_a_pending_observer() {
        let fiber = ctx();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let unsub = fiber.add_observer(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        unsub.call();
        fiber.done(FiberOutcome::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn interrupt_is_idempotent_and_latches_when_uninterruptible() {
        let fiber: Arc<FiberContext<&str>> = ctx();
        fiber.set_interruptible(false);
        fiber.interrupt();
        fiber.interrupt();
        assert!(fiber.is_interrupted());
        assert!(!fiber.is_done());
        assert!(fiber.check_interrupt().is_none());

        fiber.set_interruptible(true);
        assert!(fiber.check_interrupt().is_some());
    }

    #[test]
    fn interrupt_completes_fiber_when_interruptible() {
        let fiber: Arc<FiberContext<&str>> = ctx();
        fiber.interrupt();
        match fiber.status() {
            FiberStatus::Done(FiberOutcome::Failure(Cause::Interrupt(_))) => {}
            other => panic!("expected Done(Failure(Interrupt(_))), got {other:?}"),
        }
    }
}

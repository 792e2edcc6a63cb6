//! The lifecycle states a [`super::FiberContext`] moves through.
//!
//! A fiber's success *value* is never stored here — it travels to a
//! joiner through a dedicated one-shot channel (see `effect::fiber_ops`),
//! so broadcasting "this fiber is done" to several observers (a racing
//! sibling, an `ensuring` finalizer, a status query) never needs the
//! success type to be `Clone`. What every observer does need, and does
//! get, is the failure shape.

use crate::cause::Cause;

/// How a fiber finished. A successful exit carries nothing here; only
/// the failure cause is broadcast.
#[derive(Debug, Clone)]
pub enum FiberOutcome<E> {
    Success,
    Failure(Cause<E>),
}

impl<E> FiberOutcome<E> {
    pub fn is_success(&self) -> bool {
        matches!(self, FiberOutcome::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FiberOutcome::Failure(_))
    }
}

/// A point-in-time snapshot of a fiber's lifecycle state.
#[derive(Debug, Clone)]
pub enum FiberStatus<E> {
    Running,
    Suspended,
    Done(FiberOutcome<E>),
}

impl<E> FiberStatus<E> {
    pub fn is_done(&self) -> bool {
        matches!(self, FiberStatus::Done(_))
    }

    pub fn run_state(&self) -> RunState {
        match self {
            FiberStatus::Running => RunState::Running,
            FiberStatus::Suspended => RunState::Suspended,
            FiberStatus::Done(_) => RunState::Done,
        }
    }
}

/// The three-way lifecycle state with no failure detail, returned by the
/// `fiber_status` combinator for callers who only want to poll liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Suspended,
    Done,
}

/// A completed fiber's terminal result, carrying its actual success value
/// — unlike [`FiberOutcome`], which only ever broadcasts the failure
/// shape. This is what `await_fiber` yields: observing a fiber this way
/// never propagates its failure to the observer, it only reports it.
#[derive(Debug)]
pub enum FiberExit<E, A> {
    Success(A),
    Failure(Cause<E>),
}

impl<E, A> FiberExit<E, A> {
    pub fn is_success(&self) -> bool {
        matches!(self, FiberExit::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FiberExit::Failure(_))
    }

    pub fn success(self) -> Option<A> {
        match self {
            FiberExit::Success(a) => Some(a),
            FiberExit::Failure(_) => None,
        }
    }

    pub fn cause(self) -> Option<Cause<E>> {
        match self {
            FiberExit::Failure(cause) => Some(cause),
            FiberExit::Success(_) => None,
        }
    }
}

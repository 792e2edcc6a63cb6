//! Invariant violations in the scheduler's own bookkeeping.
//!
//! These never travel through an effect's `Cause<E>` as a first-class
//! error kind — they indicate a bug in this crate's own fiber
//! accounting, not anything the calling code did wrong. The interpreter
//! always wraps one as a [`crate::cause::Defect`] and folds it into
//! `Cause::Die` rather than exposing a separate error channel, so every
//! path out of the interpreter still produces a single `FiberExit`-shaped
//! result.

use std::fmt;

/// A scheduler-internal invariant violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A [`crate::effect::FiberHandle`] was joined a second time; its
    /// one-shot result channel was already consumed by the first join.
    FiberAlreadyJoined,
    /// A forked fiber's task was dropped (e.g. the executor shut down)
    /// before it ever reported a result back through its result channel.
    FiberDisappeared { during: &'static str },
    /// An `Async` registration's completer was dropped without either
    /// `resolve` or `reject` ever being called.
    AsyncCompleterDropped,
    /// `race`/`race_first`/`all` was called with zero participants; there
    /// is no winner (or, for `all`, a vacuous one) to resolve to.
    EmptyParticipants { combinator: &'static str },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::FiberAlreadyJoined => {
                write!(f, "fiber already joined: a FiberHandle can only be joined once")
            }
            RuntimeError::FiberDisappeared { during } => {
                write!(f, "a fiber disappeared without completing during {during}")
            }
            RuntimeError::AsyncCompleterDropped => {
                write!(f, "async completer dropped without resolving")
            }
            RuntimeError::EmptyParticipants { combinator } => {
                write!(f, "{combinator} called with no participants")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_violation() {
        assert_eq!(
            RuntimeError::FiberAlreadyJoined.to_string(),
            "fiber already joined: a FiberHandle can only be joined once"
        );
        assert_eq!(
            RuntimeError::FiberDisappeared { during: "race" }.to_string(),
            "a fiber disappeared without completing during race"
        );
    }
}

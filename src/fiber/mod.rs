//! Fiber identity and lifecycle: an independently schedulable unit of
//! cooperative execution, identified by a [`FiberId`] and tracked by a
//! [`FiberContext`].
//!
//! The public, typed handle returned to callers of `fork` lives in
//! [`crate::effect::FiberHandle`] — it pairs a (type-erased)
//! `FiberContext` with the one-shot channel that actually carries the
//! forked effect's success value, since that value generally isn't
//! `Clone` and can't be broadcast the way a failure `Cause` can.

mod context;
mod id;
mod status;

pub use context::{FiberContext, Unsubscribe};
pub use id::{FiberId, FiberIdAllocator};
pub use status::{FiberExit, FiberOutcome, FiberStatus, RunState};

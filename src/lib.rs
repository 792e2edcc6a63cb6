//! fibrous
//!
//! A typed functional effect algebra with a fiber-based interpreter:
//! build an [`effect::Effect`] with the constructors and combinators in
//! [`effect`], then hand it to a [`runtime::Runtime`] to interpret it with
//! structured concurrency, cooperative cancellation, and a [`cause::Cause`]
//! tree that preserves both sequential and parallel failure history.
//!
//! ```
//! use fibrous::effect::{fail, succeed};
//! use fibrous::runtime::Runtime;
//!
//! let rt = Runtime::default();
//! let program = succeed::<&str, i32>(1)
//!     .map(|x| x + 1)
//!     .flat_map(|x| succeed(x * 2));
//! assert_eq!(rt.unsafe_run(program), 4);
//! ```

pub mod cause;
pub mod effect;
pub mod either;
pub mod environment;
pub mod exit;
mod fiber;
mod interpreter;
pub mod runtime;
pub mod runtime_error;

pub use cause::Cause;
pub use effect::Effect;
pub use either::Either;
pub use environment::{Environment, Tag, tag};
pub use exit::Exit;
pub use fiber::{FiberExit, FiberId, FiberStatus, RunState};
pub use interpreter::SchedulerConfig;
pub use runtime::Runtime;

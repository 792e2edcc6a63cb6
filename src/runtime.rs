//! The façade that binds a service registry to the interpreter and exposes
//! "run and observe" entry points.
//!
//! Building an [`Effect`] never runs anything; a `Runtime` is what actually
//! drives one to completion. Each `run_*`/`unsafe_run`/`safe_run_*` call
//! spawns the effect as a fresh top-level fiber on the runtime's shared
//! [`SchedulerHandle`] and blocks the calling thread (via `smol::block_on`)
//! until that fiber is `Done`.

use std::fmt;

use crate::cause::{Cause, Defect, Squashed};
use crate::effect::Effect;
use crate::either::Either;
use crate::environment::{Environment, Tag};
use crate::exit::Exit;
use crate::interpreter::{SchedulerConfig, SchedulerHandle, spawn_fiber};
use crate::runtime_error::RuntimeError;

/// Binds a read-only [`Environment`] to a scheduler and interprets
/// [`Effect`] values against it.
///
/// `provide_service` never mutates an existing `Runtime`; it returns a new
/// one sharing the same underlying scheduler but carrying an extended
/// environment, mirroring [`Environment::with_service`]'s own
/// copy-on-extend contract.
#[derive(Clone)]
pub struct Runtime {
    env: Environment,
    scheduler: SchedulerHandle,
}

impl Default for Runtime {
    /// The default runtime: an empty service registry, default scheduler
    /// tuning.
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Runtime {
    /// Build a runtime with a fresh, empty environment and the given
    /// scheduler tuning.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            env: Environment::empty(),
            scheduler: SchedulerHandle::new(config),
        }
    }

    /// Build a runtime whose environment already carries `env`'s bound
    /// services (`withServices` in the public surface).
    pub fn with_services(env: Environment) -> Self {
        Self {
            env,
            scheduler: SchedulerHandle::new(SchedulerConfig::default()),
        }
    }

    /// Bind `service` under `tag`, returning a new runtime. `self` keeps
    /// its own environment untouched; both runtimes share the same
    /// scheduler.
    pub fn provide_service<S: Send + Sync + 'static>(&self, tag: Tag<S>, service: S) -> Self {
        Self {
            env: self.env.with_service(tag, service),
            scheduler: self.scheduler.clone(),
        }
    }

    fn run_to_result<E, A>(&self, effect: Effect<E, A>) -> Result<A, Cause<E>>
    where
        E: Clone + Send + 'static,
        A: Send + 'static,
    {
        let env = self.env.with_scheduler(self.scheduler.clone());
        let repr = effect.into_repr();
        let (_ctx, rx) = spawn_fiber(repr, env);
        let outcome = smol::block_on(self.scheduler.executor().run(async { rx.recv().await }));
        match outcome {
            Ok(Ok(value)) => Ok(crate::effect::unerase::<A>(value)),
            Ok(Err(cause)) => Err(cause),
            Err(_) => Err(Cause::die(Defect::new(RuntimeError::FiberDisappeared {
                during: "top-level run",
            }))),
        }
    }

    /// Run `effect` to completion, returning its success value. On
    /// failure, panics: a typed `Fail` panics with its `Display`
    /// rendering, a `Die` with the defect's rendering, an `Interrupt`
    /// naming the interrupting fiber.
    pub fn unsafe_run<E, A>(&self, effect: Effect<E, A>) -> A
    where
        E: Clone + fmt::Display + Send + 'static,
        A: Send + 'static,
    {
        match self.run_to_result(effect) {
            Ok(a) => a,
            Err(cause) => panic!("{}", render_unrecovered(&cause)),
        }
    }

    /// Run `effect`, observing a typed failure as `Either::Left` and a
    /// success as `Either::Right`. A `Die`/`Interrupt` cause is not a
    /// typed `E`, so (mirroring `unsafe_run`) it still panics rather than
    /// silently widening `E`.
    pub fn safe_run_either<E, A>(&self, effect: Effect<E, A>) -> Either<E, A>
    where
        E: Clone + fmt::Display + Send + 'static,
        A: Send + 'static,
    {
        match self.run_to_result(effect) {
            Ok(a) => Either::Right(a),
            Err(cause) => Either::Left(expect_fail(cause)),
        }
    }

    /// Run `effect`, flattening its `Cause<E>` (if any) down to the single
    /// most relevant error via [`Cause::squash`].
    pub fn safe_run_exit<E, A>(&self, effect: Effect<E, A>) -> Exit<E, A>
    where
        E: Clone + fmt::Display + Send + 'static,
        A: Send + 'static,
    {
        match self.run_to_result(effect) {
            Ok(a) => Exit::Success(a),
            Err(cause) => Exit::Failure(expect_fail(cause)),
        }
    }

    /// Run `effect`, returning the plain `Result<A, E>` union observation
    /// for call sites that just want `?`-compatible error propagation.
    pub fn safe_run_union<E, A>(&self, effect: Effect<E, A>) -> Result<A, E>
    where
        E: Clone + fmt::Display + Send + 'static,
        A: Send + 'static,
    {
        self.run_to_result(effect).map_err(expect_fail)
    }
}

/// Collapse a failure cause to its squashed typed error, panicking if the
/// squash resolved to a `Die`/`Interrupt`/`Empty` instead — the `safe_run_*`
/// family only widens as far as the typed error channel `E`; defects and
/// interruption remain unrecoverable host-level conditions, exactly as
/// `foldM`/`orElse` never catch them either.
fn expect_fail<E: Clone + fmt::Display>(cause: Cause<E>) -> E {
    match cause.squash() {
        Squashed::Fail(e) => e.clone(),
        other => panic!("{}", render_squashed(&other)),
    }
}

fn render_unrecovered<E: fmt::Display + Clone>(cause: &Cause<E>) -> String {
    render_squashed(&cause.squash())
}

fn render_squashed<E: fmt::Display>(squashed: &Squashed<'_, E>) -> String {
    match squashed {
        Squashed::Empty => "effect failed with an empty cause".to_string(),
        Squashed::Fail(e) => format!("effect failed: {e}"),
        Squashed::Die(d) => format!("effect died: {}", d.render()),
        Squashed::Interrupt(id) => format!("effect interrupted by fiber {id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{fail, succeed, sync};

    #[test]
    fn unsafe_run_yields_the_success_value() {
        let rt = Runtime::default();
        assert_eq!(rt.unsafe_run(succeed::<&str, i32>(42)), 42);
    }

    #[test]
    #[should_panic(expected = "effect failed: boom")]
    fn unsafe_run_panics_on_typed_failure() {
        let rt = Runtime::default();
        rt.unsafe_run(fail::<&str, i32>("boom"));
    }

    #[test]
    fn safe_run_either_reports_typed_failure() {
        let rt = Runtime::default();
        let result = rt.safe_run_either(fail::<&str, i32>("boom"));
        assert_eq!(result, Either::Left("boom"));
    }

    #[test]
    fn safe_run_exit_reports_success_and_failure() {
        let rt = Runtime::default();
        assert_eq!(rt.safe_run_exit(succeed::<&str, i32>(1)), Exit::Success(1));
        assert_eq!(
            rt.safe_run_exit(fail::<&str, i32>("boom")),
            Exit::Failure("boom")
        );
    }

    #[test]
    fn safe_run_union_is_a_plain_result() {
        let rt = Runtime::default();
        assert_eq!(rt.safe_run_union(succeed::<&str, i32>(1)), Ok(1));
        assert_eq!(rt.safe_run_union(fail::<&str, i32>("boom")), Err("boom"));
    }

    #[test]
    fn provide_service_does_not_affect_the_original_runtime() {
        use crate::environment::tag;

        struct Clock {
            now: u64,
        }
        let clock_tag = tag::<Clock>("clock");

        let base = Runtime::default();
        let extended = base.provide_service(clock_tag, Clock { now: 7 });

        let seen_in_extended =
            extended.unsafe_run(sync::<&str, u64, _>(move |env| env.get(clock_tag).unwrap().now));
        assert_eq!(seen_in_extended, 7);

        let seen_in_base =
            base.unsafe_run(sync::<&str, bool, _>(move |env| env.get(clock_tag).is_some()));
        assert!(!seen_in_base);
    }
}

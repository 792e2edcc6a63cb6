//! The cooperative executor shared by every fiber a [`crate::Runtime`]
//! spawns, and the tuning knobs around it.

use std::sync::Arc;

/// Tuning knobs for a [`crate::Runtime`]'s scheduler.
///
/// `yield_after_reductions` bounds how many primitive reductions a single
/// fiber performs between suspensions before `eval` cooperatively yields
/// back to the executor, so a long `FlatMap` chain can't starve sibling
/// fibers on a single-threaded executor. `None` disables the bound (the
/// default `smol::Executor` already time-slices fairly enough for most
/// uses).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub yield_after_reductions: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            yield_after_reductions: None,
        }
    }
}

struct SchedulerInner {
    executor: smol::Executor<'static>,
    config: SchedulerConfig,
}

/// A cheaply cloneable handle to the executor a running [`crate::Runtime`]
/// uses to spawn fibers. Effects reach it via
/// [`crate::environment::Environment::scheduler`]; nothing outside
/// `effect`/`interpreter` touches it directly.
#[derive(Clone)]
pub(crate) struct SchedulerHandle(Arc<SchedulerInner>);

impl SchedulerHandle {
    pub(crate) fn new(config: SchedulerConfig) -> Self {
        Self(Arc::new(SchedulerInner {
            executor: smol::Executor::new(),
            config,
        }))
    }

    pub(crate) fn executor(&self) -> &smol::Executor<'static> {
        &self.0.executor
    }

    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.0.config
    }
}

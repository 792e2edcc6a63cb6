//! The service registry threaded read-only through every run.
//!
//! A [`Tag`] is a typed key; an [`Environment`] is a keyed map from tag to
//! service value. `Runtime::provide_service` never mutates an existing
//! registry — it clones the map and returns a new one, matching the rest
//! of the design's "no shared mutable environment" stance.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::interpreter::SchedulerHandle;

/// A typed key identifying a service of type `S`.
///
/// Two tags for the same `S` are interchangeable (lookup is by `TypeId`,
/// not by the tag value itself); `name` exists only for diagnostics.
pub struct Tag<S> {
    name: &'static str,
    _marker: PhantomData<fn() -> S>,
}

impl<S> Tag<S> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<S> Clone for Tag<S> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<S> Copy for Tag<S> {}

impl<S> fmt::Debug for Tag<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.name)
    }
}

/// `tag(id)` from the public surface: a convenience constructor so call
/// sites read `tag::<Clock>("clock")` rather than `Tag::<Clock>::new(...)`.
pub fn tag<S>(name: &'static str) -> Tag<S> {
    Tag::new(name)
}

/// A read-only, keyed map from service tag to service value.
///
/// Services are looked up by `TypeId`, so a given type `S` can only be
/// bound once per environment; a later `insert` for the same `S`
/// shadows the earlier one in the returned environment (the original is
/// untouched).
#[derive(Clone, Default)]
pub struct Environment {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    scheduler: Option<SchedulerHandle>,
}

impl Environment {
    pub fn empty() -> Self {
        Self {
            services: HashMap::new(),
            scheduler: None,
        }
    }

    /// Attach the running interpreter's scheduler handle. Called once by
    /// `Runtime` before interpretation starts; effects never see an
    /// `Environment` without one.
    pub(crate) fn with_scheduler(&self, scheduler: SchedulerHandle) -> Self {
        Self {
            services: self.services.clone(),
            scheduler: Some(scheduler),
        }
    }

    /// Panics if called on an `Environment` that was never run through
    /// `Runtime` — every effect evaluation path attaches one first.
    pub(crate) fn scheduler(&self) -> &SchedulerHandle {
        self.scheduler
            .as_ref()
            .expect("Environment used outside of a Runtime evaluation")
    }

    /// Bind `service` under `tag`, returning a new environment. `self` is
    /// unaffected.
    pub fn with_service<S: Send + Sync + 'static>(&self, _tag: Tag<S>, service: S) -> Self {
        let mut services = self.services.clone();
        services.insert(TypeId::of::<S>(), Arc::new(service));
        Self {
            services,
            scheduler: self.scheduler.clone(),
        }
    }

    pub fn get<S: Send + Sync + 'static>(&self, _tag: Tag<S>) -> Option<Arc<S>> {
        self.services
            .get(&TypeId::of::<S>())
            .and_then(|svc| Arc::clone(svc).downcast::<S>().ok())
    }

    pub fn contains<S: Send + Sync + 'static>(&self, tag: Tag<S>) -> bool {
        self.get(tag).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("services", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Clock {
        now_millis: u64,
    }

    const CLOCK: Tag<Clock> = Tag::new("clock");

    #[test]
    fn empty_environment_has_no_services() {
        let env = Environment::empty();
        assert!(env.get(CLOCK).is_none());
        assert!(env.is_empty());
    }

    #[test]
    fn with_service_does_not_mutate_the_original() {
        let base = Environment::empty();
        let extended = base.with_service(CLOCK, Clock { now_millis: 42 });
        assert!(base.get(CLOCK).is_none());
        assert_eq!(extended.get(CLOCK).unwrap().now_millis, 42);
    }

    #[test]
    fn later_binding_for_same_type_shadows_the_earlier_one() {
        let env = Environment::empty()
            .with_service(CLOCK, Clock { now_millis: 1 })
            .with_service(CLOCK, Clock { now_millis: 2 });
        assert_eq!(env.get(CLOCK).unwrap().now_millis, 2);
    }
}

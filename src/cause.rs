//! The `Cause` algebra: an inductive record of why a fiber failed.
//!
//! A `Cause<E>` is a small tree rather than a single error value so that
//! sequential composition (a finalizer failing after its primary effect)
//! and parallel composition (two concurrent children both failing) can be
//! represented without throwing information away. `Empty` is the identity
//! element for both `sequential` and `both`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::fiber::FiberId;

/// An opaque, downcastable defect payload.
///
/// Carries either a caught panic payload or an explicitly constructed
/// defect. Cloning is cheap (an `Arc` clone) since a `Cause` tree may be
/// observed by more than one fiber.
#[derive(Clone)]
pub struct Defect(Arc<dyn Any + Send + Sync>);

impl Defect {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Render the defect as a human-readable string, falling back to a
    /// generic placeholder when the payload carries no text.
    pub fn render(&self) -> String {
        if let Some(s) = self.0.downcast_ref::<String>() {
            return s.clone();
        }
        if let Some(s) = self.0.downcast_ref::<&'static str>() {
            return (*s).to_string();
        }
        "<opaque defect>".to_string()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Defect({})", self.render())
    }
}

/// Why a fiber failed, preserving both sequential and parallel structure.
#[derive(Debug, Clone)]
pub enum Cause<E> {
    /// Identity element under `sequential` and `both`.
    Empty,
    /// A typed, anticipated error.
    Fail(E),
    /// An untyped defect (the analogue of an unchecked exception).
    Die(Defect),
    /// This fiber was cancelled by the fiber identified by `FiberId`.
    Interrupt(FiberId),
    /// `right` occurred after `left` (a finalizer failing after the primary).
    Then(Box<Cause<E>>, Box<Cause<E>>),
    /// `left` and `right` occurred concurrently.
    Both(Box<Cause<E>>, Box<Cause<E>>),
}

impl<E> Cause<E> {
    pub fn empty() -> Self {
        Cause::Empty
    }

    pub fn fail(error: E) -> Self {
        Cause::Fail(error)
    }

    pub fn die(defect: Defect) -> Self {
        Cause::Die(defect)
    }

    pub fn interrupt(fiber_id: FiberId) -> Self {
        Cause::Interrupt(fiber_id)
    }

    /// Sequential composition, eliding `Empty`.
    pub fn sequential(left: Self, right: Self) -> Self {
        match (left, right) {
            (Cause::Empty, right) => right,
            (left, Cause::Empty) => left,
            (left, right) => Cause::Then(Box::new(left), Box::new(right)),
        }
    }

    /// Parallel composition, eliding `Empty`.
    pub fn both(left: Self, right: Self) -> Self {
        match (left, right) {
            (Cause::Empty, right) => right,
            (left, Cause::Empty) => left,
            (left, right) => Cause::Both(Box::new(left), Box::new(right)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cause::Empty)
    }

    /// True for any cause that is not `Empty`.
    pub fn is_failure(&self) -> bool {
        !self.is_empty()
    }

    pub fn is_die(&self) -> bool {
        match self {
            Cause::Die(_) => true,
            Cause::Then(l, r) | Cause::Both(l, r) => l.is_die() || r.is_die(),
            _ => false,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        match self {
            Cause::Interrupt(_) => true,
            Cause::Then(l, r) | Cause::Both(l, r) => l.is_interrupted() || r.is_interrupted(),
            _ => false,
        }
    }

    /// Left-to-right preorder traversal of the `Fail` leaves.
    pub fn failures(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.collect_failures(&mut out);
        out
    }

    fn collect_failures<'a>(&'a self, out: &mut Vec<&'a E>) {
        match self {
            Cause::Fail(e) => out.push(e),
            Cause::Then(l, r) | Cause::Both(l, r) => {
                l.collect_failures(out);
                r.collect_failures(out);
            }
            _ => {}
        }
    }

    /// Left-to-right preorder traversal of the `Die` leaves.
    pub fn defects(&self) -> Vec<&Defect> {
        let mut out = Vec::new();
        self.collect_defects(&mut out);
        out
    }

    fn collect_defects<'a>(&'a self, out: &mut Vec<&'a Defect>) {
        match self {
            Cause::Die(d) => out.push(d),
            Cause::Then(l, r) | Cause::Both(l, r) => {
                l.collect_defects(out);
                r.collect_defects(out);
            }
            _ => {}
        }
    }

    /// Left-to-right preorder traversal of the `Interrupt` leaves.
    pub fn interruptors(&self) -> Vec<FiberId> {
        let mut out = Vec::new();
        self.collect_interruptors(&mut out);
        out
    }

    fn collect_interruptors(&self, out: &mut Vec<FiberId>) {
        match self {
            Cause::Interrupt(id) => out.push(*id),
            Cause::Then(l, r) | Cause::Both(l, r) => {
                l.collect_interruptors(out);
                r.collect_interruptors(out);
            }
            _ => {}
        }
    }

    /// Map only the `Fail` leaves; all other leaves and the tree shape are
    /// preserved identically.
    pub fn map<F, B>(self, f: &mut F) -> Cause<B>
    where
        F: FnMut(E) -> B,
    {
        match self {
            Cause::Empty => Cause::Empty,
            Cause::Fail(e) => Cause::Fail(f(e)),
            Cause::Die(d) => Cause::Die(d),
            Cause::Interrupt(id) => Cause::Interrupt(id),
            Cause::Then(l, r) => Cause::Then(Box::new(l.map(f)), Box::new(r.map(f))),
            Cause::Both(l, r) => Cause::Both(Box::new(l.map(f)), Box::new(r.map(f))),
        }
    }

    /// Collapse to a single observation: the first `Fail`, else the first
    /// `Die`, else the first `Interrupt`'s fiber id, else `None` for `Empty`.
    pub fn squash(&self) -> Squashed<'_, E> {
        if let Some(e) = self.failures().into_iter().next() {
            return Squashed::Fail(e);
        }
        if let Some(d) = self.defects().into_iter().next() {
            return Squashed::Die(d.clone());
        }
        if let Some(id) = self.interruptors().into_iter().next() {
            return Squashed::Interrupt(id);
        }
        Squashed::Empty
    }

    /// A bracketed prefix-notation rendering of the tree, matching the
    /// grammar `Empty | Fail(<str>) | Die(<str>) | Interrupt(Fiber#<n>) |
    /// Then(<c>, <c>) | Both(<c>, <c>)`.
    pub fn pretty_print(&self) -> String
    where
        E: fmt::Display,
    {
        match self {
            Cause::Empty => "Empty".to_string(),
            Cause::Fail(e) => format!("Fail({e})"),
            Cause::Die(d) => format!("Die({})", d.render()),
            Cause::Interrupt(id) => format!("Interrupt(Fiber#{})", id.as_u64()),
            Cause::Then(l, r) => format!("Then({}, {})", l.pretty_print(), r.pretty_print()),
            Cause::Both(l, r) => format!("Both({}, {})", l.pretty_print(), r.pretty_print()),
        }
    }
}

/// The result of [`Cause::squash`].
#[derive(Debug, Clone)]
pub enum Squashed<'a, E> {
    Empty,
    Fail(&'a E),
    Die(Defect),
    Interrupt(FiberId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(n: u64) -> FiberId {
        FiberId::for_test(n)
    }

    #[test]
    fn sequential_elides_empty() {
        let c: Cause<&str> = Cause::fail("boom");
        assert!(matches!(
            Cause::sequential(Cause::Empty, c.clone()),
            Cause::Fail("boom")
        ));
        assert!(matches!(
            Cause::sequential(c, Cause::Empty),
            Cause::Fail("boom")
        ));
    }

    #[test]
    fn both_elides_empty() {
        let c: Cause<&str> = Cause::fail("boom");
        assert!(matches!(
            Cause::both(Cause::Empty, c.clone()),
            Cause::Fail("boom")
        ));
        assert!(matches!(Cause::both(c, Cause::Empty), Cause::Fail("boom")));
    }

    #[test]
    fn extractors_preorder() {
        let both = Cause::both(Cause::fail("a"), Cause::fail("b"));
        assert_eq!(both.failures(), vec![&"a", &"b"]);
    }

    #[test]
    fn map_only_touches_fail_leaves() {
        let tree = Cause::both(Cause::fail(1), Cause::interrupt(fid(7)));
        let mapped = tree.map(&mut |n: i32| n * 10);
        assert_eq!(mapped.failures(), vec![&10]);
        assert_eq!(mapped.interruptors(), vec![fid(7)]);
    }

    #[test]
    fn map_preserves_shape_for_both_and_then() {
        let tree: Cause<i32> = Cause::Then(
            Box::new(Cause::fail(1)),
            Box::new(Cause::Both(
                Box::new(Cause::fail(2)),
                Box::new(Cause::Empty),
            )),
        );
        let mapped = tree.map(&mut |n| n + 1);
        assert_eq!(mapped.failures(), vec![&2, &3]);
    }

    #[test]
    fn squash_prefers_fail_over_die_over_interrupt() {
        let only_interrupt: Cause<&str> = Cause::interrupt(fid(1));
        assert!(matches!(only_interrupt.squash(), Squashed::Interrupt(_)));

        let die_and_interrupt = Cause::both(Cause::die(Defect::new("x")), Cause::interrupt(fid(1)));
        assert!(matches!(die_and_interrupt.squash(), Squashed::Die(_)));

        let all_three = Cause::both(
            Cause::fail("e"),
            Cause::both(Cause::die(Defect::new("x")), Cause::interrupt(fid(1))),
        );
        assert!(matches!(all_three.squash(), Squashed::Fail(&"e")));
    }

    #[test]
    fn pretty_print_grammar() {
        let tree = Cause::both(Cause::fail("e"), Cause::interrupt(fid(3)));
        assert_eq!(tree.pretty_print(), "Both(Fail(e), Interrupt(Fiber#3))");
        let empty: Cause<&str> = Cause::Empty;
        assert_eq!(empty.pretty_print(), "Empty");
    }

    #[test]
    fn is_die_and_is_interrupted_see_through_composites() {
        let tree = Cause::sequential(Cause::fail("e"), Cause::die(Defect::new("x")));
        assert!(tree.is_die());
        assert!(!tree.is_interrupted());
    }
}

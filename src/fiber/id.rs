//! Process-unique fiber identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// `(id, startTime)` — `id` is a monotonic, process-unique counter;
/// `startTime` is informational only and never used for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId {
    id: u64,
    start_time_millis: u128,
}

impl FiberId {
    pub fn as_u64(self) -> u64 {
        self.id
    }

    pub fn start_time_millis(self) -> u128 {
        self.start_time_millis
    }

    /// Build an id directly for unit tests that need deterministic values
    /// without going through [`FiberIdAllocator`].
    #[cfg(test)]
    pub fn for_test(id: u64) -> Self {
        Self {
            id,
            start_time_millis: 0,
        }
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// Allocates process-unique [`FiberId`]s from a monotonic counter.
///
/// Shared by every `Runtime`/`Interpreter` instance in a process via a
/// single static counter, so ids stay unique even across independently
/// constructed runtimes.
pub struct FiberIdAllocator;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl FiberIdAllocator {
    pub fn next() -> FiberId {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let start_time_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        FiberId {
            id,
            start_time_millis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let a = FiberIdAllocator::next();
        let b = FiberIdAllocator::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }
}

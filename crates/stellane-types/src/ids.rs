use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-wide monotonic counter backing [`TaskId::next`].
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a [`crate::task::Task`].
///
/// Generated from a process-local monotonic counter rather than a UUID: task
/// ids are compared and hashed far more often than they are displayed across
/// process boundaries, so a cheap `u64` is the right shape here. Journal trace
/// ids, which *do* cross process boundaries (written to disk, replayed after a
/// restart), use [`TraceId`] instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifies a worker thread within a [`crate::scheduler::Scheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Opaque handle returned by timer registration. Carries a generation so the
/// event loop can discard stale entries left in the timer heap after
/// cancellation rather than doing an O(n) heap deletion (see spec Design
/// Notes: "Priority queue of timers containing logically-cancelled entries").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub(crate) slot: u64,
    pub(crate) generation: u64,
}

impl TimerId {
    pub const fn new(slot: u64, generation: u64) -> Self {
        Self { slot, generation }
    }

    pub const fn slot(self) -> u64 {
        self.slot
    }

    pub const fn generation(self) -> u64 {
        self.generation
    }
}

/// Unique identifier for a journal entry / recovery trace, persisted to disk
/// and surviving process restarts. Backed by a UUIDv4, stored in the wire
/// format as a pair of little-endian `u64` halves (see [`crate::wire`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_parts(hi: u64, lo: u64) -> Self {
        let bytes = ((hi as u128) << 64 | lo as u128).to_be_bytes();
        Self(Uuid::from_bytes(bytes))
    }

    /// Splits into `(low, high)` 64-bit halves, little-endian wire order,
    /// matching the `[u64 trace_id_low][u64 trace_id_high]` record fields.
    pub fn to_parts(self) -> (u64, u64) {
        let n = u128::from_be_bytes(*self.0.as_bytes());
        (n as u64, (n >> 64) as u64)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_monotonic_and_distinct() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn trace_id_round_trips_through_parts() {
        let id = TraceId::new_v4();
        let (lo, hi) = id.to_parts();
        let rebuilt = TraceId::from_parts(hi, lo);
        assert_eq!(id, rebuilt);
    }
}

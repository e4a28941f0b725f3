use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use crate::ids::WorkerId;

/// Per-worker bookkeeping the scheduler exposes for load queries, rebalancing
/// decisions, and the stats collector. Counters use relaxed atomics per spec
/// §5 — cheap on the hot dispatch path, consistent enough for the collector's
/// periodic snapshot reads.
#[derive(Debug)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub bound_core: Option<usize>,
    pub numa_node: Option<u32>,
    current_task_count: AtomicUsize,
    processed_count: AtomicU64,
    last_activity_nanos: AtomicU64,
    paused: std::sync::atomic::AtomicBool,
    epoch: Instant,
}

impl WorkerStats {
    pub fn new(id: WorkerId, bound_core: Option<usize>, numa_node: Option<u32>) -> Self {
        Self {
            id,
            bound_core,
            numa_node,
            current_task_count: AtomicUsize::new(0),
            processed_count: AtomicU64::new(0),
            last_activity_nanos: AtomicU64::new(0),
            paused: std::sync::atomic::AtomicBool::new(false),
            epoch: Instant::now(),
        }
    }

    pub fn current_task_count(&self) -> usize {
        self.current_task_count.load(Ordering::Relaxed)
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn task_started(&self) {
        self.current_task_count.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn task_finished(&self) {
        self.current_task_count.fetch_sub(1, Ordering::Relaxed);
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    fn touch(&self) {
        let nanos = self.epoch.elapsed().as_nanos() as u64;
        self.last_activity_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> std::time::Duration {
        let last = self.last_activity_nanos.load(Ordering::Relaxed);
        self.epoch
            .elapsed()
            .saturating_sub(std::time::Duration::from_nanos(last))
    }
}

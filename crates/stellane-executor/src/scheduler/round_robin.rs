use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use stellane_types::{Result, SchedulableMeta, WorkerId, WorkerStats};

use crate::task::Schedulable;

/// New tasks are placed on workers in round-robin order regardless of
/// current load; each worker owns its own local FIFO queue, so a task
/// rescheduled by a wake goes back to the same worker it started on.
pub struct RoundRobinScheduler {
    queues: Vec<Mutex<VecDeque<Schedulable>>>,
    cursor: AtomicUsize,
    stats: Vec<Arc<WorkerStats>>,
}

impl RoundRobinScheduler {
    pub fn new(stats: Vec<Arc<WorkerStats>>) -> Self {
        let queues = stats.iter().map(|_| Mutex::new(VecDeque::new())).collect();
        Self {
            queues,
            cursor: AtomicUsize::new(0),
            stats,
        }
    }

    pub fn place(&self, _meta: &SchedulableMeta) -> Result<WorkerId> {
        let n = self.queues.len();
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
        Ok(WorkerId(idx))
    }

    pub fn enqueue(&self, item: Schedulable) {
        let worker = item.meta.worker_id.expect("placed before enqueue");
        self.queues[worker.0].lock().push_back(item);
    }

    pub fn next(&self, worker: WorkerId) -> Option<Schedulable> {
        self.queues[worker.0].lock().pop_front()
    }

    pub fn try_steal(&self, _worker: WorkerId) -> Option<Schedulable> {
        None
    }

    pub fn len(&self, worker: WorkerId) -> usize {
        self.queues[worker.0].lock().len()
    }
}

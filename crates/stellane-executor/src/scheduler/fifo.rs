use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use stellane_types::{Result, SchedulableMeta, WorkerId, WorkerStats};

use crate::task::Schedulable;

/// Every worker pulls from one shared FIFO queue. Simplest policy: no
/// per-worker affinity, no stealing, submission order is preserved exactly.
pub struct FifoScheduler {
    queue: Mutex<VecDeque<Schedulable>>,
    stats: Vec<Arc<WorkerStats>>,
}

impl FifoScheduler {
    pub fn new(stats: Vec<Arc<WorkerStats>>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            stats,
        }
    }

    pub fn place(&self, _meta: &SchedulableMeta) -> Result<WorkerId> {
        Ok(WorkerId(0))
    }

    pub fn enqueue(&self, item: Schedulable) {
        self.queue.lock().push_back(item);
    }

    pub fn next(&self, _worker: WorkerId) -> Option<Schedulable> {
        self.queue.lock().pop_front()
    }

    pub fn try_steal(&self, _worker: WorkerId) -> Option<Schedulable> {
        None
    }

    pub fn len(&self, _worker: WorkerId) -> usize {
        self.queue.lock().len()
    }
}

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use stellane_types::{Result, SchedulableMeta, WorkerId, WorkerStats};

use crate::task::Schedulable;

struct Entry {
    sequence: u64,
    item: Schedulable,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.item.priority() == other.item.priority() && self.sequence == other.sequence
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; ties broken by earlier insertion (smaller
        // sequence), matching "FIFO among equals".
        self.item
            .priority()
            .cmp(&other.item.priority())
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Every worker pulls from one shared max-heap keyed on `Priority`, tied off
/// by submission order.
pub struct PriorityScheduler {
    heap: Mutex<BinaryHeap<Entry>>,
    next_sequence: AtomicU64,
    stats: Vec<Arc<WorkerStats>>,
}

impl PriorityScheduler {
    pub fn new(stats: Vec<Arc<WorkerStats>>) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_sequence: AtomicU64::new(0),
            stats,
        }
    }

    pub fn place(&self, _meta: &SchedulableMeta) -> Result<WorkerId> {
        Ok(WorkerId(0))
    }

    pub fn enqueue(&self, item: Schedulable) {
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(Entry { sequence, item });
    }

    pub fn next(&self, _worker: WorkerId) -> Option<Schedulable> {
        self.heap.lock().pop().map(|e| e.item)
    }

    pub fn try_steal(&self, _worker: WorkerId) -> Option<Schedulable> {
        None
    }

    pub fn len(&self, _worker: WorkerId) -> usize {
        self.heap.lock().len()
    }
}

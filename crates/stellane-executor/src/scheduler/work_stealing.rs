use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use stellane_types::{Result, SchedulableMeta, WorkStealingSection, WorkerId, WorkerStats};

use crate::task::Schedulable;

/// Each worker owns a local deque; placement sends a new task to whichever
/// worker currently has the fewest in-flight tasks, and stealing redistributes
/// from there. This is the only policy with genuine rebalancing: the other
/// four commit to their placement decision and never move work afterward.
pub struct WorkStealingScheduler {
    locals: Vec<Mutex<VecDeque<Schedulable>>>,
    stats: Vec<Arc<WorkerStats>>,
    steal_threshold: usize,
    max_steal_attempts: usize,
    max_tasks_per_steal: usize,
}

impl WorkStealingScheduler {
    pub fn new(stats: Vec<Arc<WorkerStats>>, config: &WorkStealingSection) -> Self {
        let locals = (0..stats.len()).map(|_| Mutex::new(VecDeque::new())).collect();
        Self {
            locals,
            stats,
            steal_threshold: config.steal_threshold,
            max_steal_attempts: config.max_steal_attempts,
            max_tasks_per_steal: config.max_tasks_per_steal,
        }
    }

    /// Test/setup-only hook: pushes directly into a worker's local deque
    /// before the worker pool starts running. Not safe to call concurrently
    /// with `next`/`try_steal` on the same worker.
    pub fn seed_worker(&self, worker: WorkerId, items: Vec<Schedulable>) {
        self.locals[worker.0].lock().extend(items);
    }

    /// New task goes to whichever worker currently has the fewest in-flight
    /// tasks (ties broken by lowest index).
    pub fn place(&self, _meta: &SchedulableMeta) -> Result<WorkerId> {
        let (idx, _) = self
            .stats
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.current_task_count()))
            .min_by_key(|&(_, count)| count)
            .expect("at least one worker");
        Ok(WorkerId(idx))
    }

    /// Re-schedules (wakes, and initial submissions routed through
    /// `Schedule::schedule`) land on the worker the task was originally
    /// placed on.
    pub fn enqueue(&self, item: Schedulable) {
        let worker = item.meta.worker_id.unwrap_or(WorkerId(0));
        self.locals[worker.0].lock().push_back(item);
    }

    pub fn next(&self, worker: WorkerId) -> Option<Schedulable> {
        self.locals[worker.0].lock().pop_front()
    }

    /// Steals from the back (the newest-pushed items) of a uniform-randomly
    /// chosen victim, trying at most `max_steal_attempts` victims. Each
    /// victim is examined with a try-lock so stealing never blocks a busy
    /// victim. Steal count is `min(max_tasks_per_steal, victim_len -
    /// steal_threshold)`; the batch beyond the first item is pushed onto the
    /// thief's own queue, and the first item is returned directly.
    pub fn try_steal(&self, worker: WorkerId) -> Option<Schedulable> {
        let n = self.locals.len();
        if n <= 1 {
            return None;
        }
        let attempts = self.max_steal_attempts.min(n - 1).max(1);
        let start = rand::rng().random_range(0..n);

        for offset in 0..attempts {
            let victim = (start + offset) % n;
            if victim == worker.0 {
                continue;
            }
            let Some(mut victim_queue) = self.locals[victim].try_lock() else {
                continue;
            };
            let victim_len = victim_queue.len();
            if victim_len <= self.steal_threshold {
                continue;
            }
            let steal_count = self.max_tasks_per_steal.min(victim_len - self.steal_threshold);
            let mut stolen: Vec<Schedulable> =
                (0..steal_count).filter_map(|_| victim_queue.pop_back()).collect();
            drop(victim_queue);

            let first = stolen.pop();
            if !stolen.is_empty() {
                self.locals[worker.0].lock().extend(stolen);
            }
            if first.is_some() {
                return first;
            }
        }
        None
    }

    /// Moves one task from the back of `from`'s queue to the back of `to`'s
    /// queue, for `Scheduler::rebalance_load`. Returns `false` if `from` was
    /// empty.
    pub fn move_one(&self, from: WorkerId, to: WorkerId) -> bool {
        let Some(item) = self.locals[from.0].lock().pop_back() else {
            return false;
        };
        self.locals[to.0].lock().push_back(item);
        true
    }

    pub fn len(&self, worker: WorkerId) -> usize {
        self.locals[worker.0].lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(n: usize) -> WorkStealingScheduler {
        let stats = (0..n)
            .map(|i| Arc::new(WorkerStats::new(WorkerId(i), None, None)))
            .collect();
        WorkStealingScheduler::new(stats, &WorkStealingSection::default())
    }

    #[test]
    fn places_on_the_least_loaded_worker() {
        let s = make(4);
        let meta = SchedulableMeta::new(
            stellane_types::Priority::NORMAL,
            stellane_types::schedulable::Affinity::none(),
        );
        s.stats[1].task_started();
        s.stats[2].task_started();
        s.stats[2].task_started();
        // worker 0 and 3 are tied at zero; lowest index wins.
        assert_eq!(s.place(&meta).unwrap(), WorkerId(0));
    }

    struct Capture(Mutex<Option<Schedulable>>);

    impl crate::task::Schedule for Capture {
        fn schedule(&self, item: Schedulable) {
            *self.0.lock() = Some(item);
        }
    }

    fn dummy_schedulable(meta: SchedulableMeta) -> Schedulable {
        let capture = Arc::new(Capture(Mutex::new(None)));
        crate::task::spawn(async { Ok::<(), stellane_types::Error>(()) }, meta, capture.clone())
            .detach();
        capture.0.lock().take().expect("schedule runs synchronously")
    }

    #[test]
    fn steal_takes_from_the_victims_back() {
        let s = make(2);
        let meta = SchedulableMeta::new(
            stellane_types::Priority::NORMAL,
            stellane_types::schedulable::Affinity::none(),
        );
        for _ in 0..5 {
            s.seed_worker(WorkerId(1), vec![dummy_schedulable(meta.clone())]);
        }
        // steal_threshold defaults to 2, so up to 3 items are stealable.
        let stolen = s.try_steal(WorkerId(0));
        assert!(stolen.is_some());
        assert_eq!(s.len(WorkerId(1)) + s.len(WorkerId(0)), 4);
    }
}

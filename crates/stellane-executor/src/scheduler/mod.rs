//! Task scheduler: five placement policies behind one tagged enum, per the
//! design note that dispatch should switch on a known-at-construction-time
//! variant rather than go through a trait object on every task submission.

mod affinity;
mod fifo;
mod priority;
mod round_robin;
mod work_stealing;
mod worker;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use stellane_types::schedulable::Affinity;
use stellane_types::{
    AffinityMode, Error, Priority, Result, RuntimeConfig, SchedulableMeta, StrategyKind, WorkerId,
    WorkerStats,
};

use crate::task::{self, JoinHandle, Schedulable, Schedule};
use affinity::AffinityScheduler;
use fifo::FifoScheduler;
use priority::PriorityScheduler;
use round_robin::RoundRobinScheduler;
use work_stealing::WorkStealingScheduler;
pub use worker::WorkerThread;

enum Policy {
    Fifo(FifoScheduler),
    Priority(PriorityScheduler),
    RoundRobin(RoundRobinScheduler),
    Affinity(AffinityScheduler),
    WorkStealing(WorkStealingScheduler),
}

pub struct Scheduler {
    policy: Policy,
    stats: Vec<Arc<WorkerStats>>,
    idle_timeout: Duration,
    max_queue_len: Option<usize>,
    workers: parking_lot::Mutex<Vec<WorkerThread>>,
}

fn build_stats(config: &RuntimeConfig, num_workers: usize) -> Vec<Arc<WorkerStats>> {
    let core_map: std::collections::HashMap<usize, usize> =
        config.affinity.worker_core_map.iter().copied().collect();
    let numa_map: std::collections::HashMap<usize, u32> = config
        .affinity
        .numa_node_assignments
        .iter()
        .copied()
        .collect();

    (0..num_workers)
        .map(|i| {
            let bound_core = match config.affinity.mode {
                AffinityMode::None => None,
                _ => core_map.get(&i).copied(),
            };
            let numa_node = numa_map.get(&i).copied();
            Arc::new(WorkerStats::new(WorkerId(i), bound_core, numa_node))
        })
        .collect()
}

impl Scheduler {
    pub fn new(config: &RuntimeConfig) -> Self {
        let num_workers = config.runtime.worker_threads.max(1);
        let stats = build_stats(config, num_workers);

        let policy = match config.runtime.strategy {
            StrategyKind::Fifo => Policy::Fifo(FifoScheduler::new(stats.clone())),
            StrategyKind::Priority => Policy::Priority(PriorityScheduler::new(stats.clone())),
            StrategyKind::RoundRobin => {
                Policy::RoundRobin(RoundRobinScheduler::new(stats.clone()))
            }
            StrategyKind::Affinity => Policy::Affinity(AffinityScheduler::new(stats.clone())),
            StrategyKind::WorkStealing | StrategyKind::Custom => Policy::WorkStealing(
                WorkStealingScheduler::new(stats.clone(), &config.work_stealing),
            ),
        };

        Self {
            policy,
            stats,
            idle_timeout: config.runtime.idle_timeout,
            max_queue_len: config.runtime.max_queue_len,
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.stats.len()
    }

    fn place(&self, meta: &SchedulableMeta) -> Result<WorkerId> {
        match &self.policy {
            Policy::Fifo(p) => p.place(meta),
            Policy::Priority(p) => p.place(meta),
            Policy::RoundRobin(p) => p.place(meta),
            Policy::Affinity(p) => p.place(meta),
            Policy::WorkStealing(p) => p.place(meta),
        }
    }

    fn enqueue(&self, item: Schedulable) {
        match &self.policy {
            Policy::Fifo(p) => p.enqueue(item),
            Policy::Priority(p) => p.enqueue(item),
            Policy::RoundRobin(p) => p.enqueue(item),
            Policy::Affinity(p) => p.enqueue(item),
            Policy::WorkStealing(p) => p.enqueue(item),
        }
    }

    fn next_for(&self, worker: WorkerId) -> Option<Schedulable> {
        match &self.policy {
            Policy::Fifo(p) => p.next(worker),
            Policy::Priority(p) => p.next(worker),
            Policy::RoundRobin(p) => p.next(worker),
            Policy::Affinity(p) => p.next(worker),
            Policy::WorkStealing(p) => p.next(worker).or_else(|| p.try_steal(worker)),
        }
    }

    pub fn queue_len(&self, worker: WorkerId) -> usize {
        match &self.policy {
            Policy::Fifo(p) => p.len(worker),
            Policy::Priority(p) => p.len(worker),
            Policy::RoundRobin(p) => p.len(worker),
            Policy::Affinity(p) => p.len(worker),
            Policy::WorkStealing(p) => p.len(worker),
        }
    }

    pub fn stats_for(&self, worker: WorkerId) -> Arc<WorkerStats> {
        self.stats[worker.0].clone()
    }

    pub fn is_paused(&self, worker: WorkerId) -> bool {
        self.stats[worker.0].is_paused()
    }

    pub fn pause_worker(&self, worker: WorkerId) {
        self.stats[worker.0].set_paused(true);
    }

    pub fn resume_worker(&self, worker: WorkerId) {
        self.stats[worker.0].set_paused(false);
    }

    /// Test/setup-only: seeds a worker's local queue directly, bypassing
    /// placement. Only meaningful for the work-stealing policy and only
    /// safe before `start()`.
    pub fn seed_worker(&self, worker: WorkerId, items: Vec<Schedulable>) {
        if let Policy::WorkStealing(p) = &self.policy {
            p.seed_worker(worker, items);
        }
    }

    /// For the work-stealing policy: any worker whose queue exceeds 2x the
    /// mean has its excess bulk-moved, from its back, to the tail of
    /// under-mean workers (round-robin among them) until the spread is
    /// restored. A no-op for every other policy, which never migrates work
    /// once placed.
    pub fn rebalance_load(&self) {
        let Policy::WorkStealing(p) = &self.policy else {
            return;
        };
        let n = self.stats.len();
        if n < 2 {
            return;
        }

        let lens: Vec<usize> = (0..n).map(|i| p.len(WorkerId(i))).collect();
        let total: usize = lens.iter().sum();
        let mean = total as f64 / n as f64;
        if mean <= 0.0 {
            return;
        }

        let mut underloaded: Vec<usize> = (0..n).filter(|&i| (lens[i] as f64) < mean).collect();
        if underloaded.is_empty() {
            return;
        }
        let mut cursor = 0;

        for (i, &len) in lens.iter().enumerate() {
            if (len as f64) <= mean * 2.0 {
                continue;
            }
            let target_len = mean.ceil() as usize;
            let mut remaining = len.saturating_sub(target_len);
            while remaining > 0 && !underloaded.is_empty() {
                let idx = cursor % underloaded.len();
                let target = underloaded[idx];
                if !p.move_one(WorkerId(i), WorkerId(target)) {
                    break;
                }
                remaining -= 1;
                if p.len(WorkerId(target)) >= target_len {
                    underloaded.remove(idx);
                } else {
                    cursor += 1;
                }
            }
        }
    }

    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        let core_ids = core_affinity::get_core_ids().unwrap_or_default();
        for i in 0..self.num_workers() {
            let bound_core = self.stats[i]
                .bound_core
                .and_then(|core| core_ids.iter().find(|c| c.id == core))
                .copied();
            workers.push(WorkerThread::spawn(
                WorkerId(i),
                self.clone(),
                self.idle_timeout,
                bound_core,
            ));
        }
    }

    pub fn stop(&self) {
        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            worker.shutdown();
        }
        workers.clear();
    }

    pub fn spawn<F, T>(self: &Arc<Self>, priority: Priority, affinity: Affinity, future: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut meta = SchedulableMeta::new(priority, affinity);
        let worker = self.place(&meta)?;
        if let Some(cap) = self.max_queue_len {
            if self.queue_len(worker) >= cap {
                return Err(Error::Backpressure(format!(
                    "worker {} queue at capacity ({cap})",
                    worker.0
                )));
            }
        }
        meta.worker_id = Some(worker);
        meta.scheduled_at = Some(SystemTime::now());
        Ok(task::spawn(future, meta, self.clone()))
    }
}

impl Schedule for Scheduler {
    fn schedule(&self, item: Schedulable) {
        self.enqueue(item);
    }
}

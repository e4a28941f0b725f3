//! Statistics collector (spec §4.6): an in-process snapshot view over the
//! scheduler's per-worker counters. No exporter wire format is built here —
//! callers query `RuntimeStats` directly and format it however they like.

use std::sync::Arc;
use std::time::Duration;

use stellane_executor::Scheduler;
use stellane_types::WorkerId;

#[derive(Clone, Debug)]
pub struct WorkerSnapshot {
    pub worker: WorkerId,
    pub queue_len: usize,
    pub current_task_count: usize,
    pub processed_count: u64,
    pub idle_for: Duration,
    pub paused: bool,
}

#[derive(Clone, Debug)]
pub struct RuntimeStats {
    pub workers: Vec<WorkerSnapshot>,
}

impl RuntimeStats {
    pub fn total_queued(&self) -> usize {
        self.workers.iter().map(|w| w.queue_len).sum()
    }

    pub fn total_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.processed_count).sum()
    }

    pub fn busiest_worker(&self) -> Option<&WorkerSnapshot> {
        self.workers.iter().max_by_key(|w| w.queue_len)
    }
}

pub fn snapshot(scheduler: &Arc<Scheduler>) -> RuntimeStats {
    let workers = (0..scheduler.num_workers())
        .map(|i| {
            let id = WorkerId(i);
            let worker_stats = scheduler.stats_for(id);
            WorkerSnapshot {
                worker: id,
                queue_len: scheduler.queue_len(id),
                current_task_count: worker_stats.current_task_count(),
                processed_count: worker_stats.processed_count(),
                idle_for: worker_stats.idle_for(),
                paused: worker_stats.is_paused(),
            }
        })
        .collect();
    RuntimeStats { workers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellane_types::RuntimeConfig;

    #[test]
    fn snapshot_reports_one_entry_per_worker() {
        let mut config = RuntimeConfig::default();
        config.runtime.worker_threads = 3;
        let scheduler = Arc::new(Scheduler::new(&config));
        let stats = snapshot(&scheduler);
        assert_eq!(stats.workers.len(), 3);
        assert_eq!(stats.total_queued(), 0);
        assert_eq!(stats.total_processed(), 0);
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use stellane_types::{Error, Result, SchedulableMeta, WorkerId, WorkerStats};

use crate::task::Schedulable;

/// Places tasks according to their `Affinity`: pinned tasks go straight to
/// `preferred_worker` (failing with `AffinityUnsatisfiable` if that worker
/// is paused and migration isn't allowed), NUMA-tagged tasks round-robin
/// among workers bound to that node, grouped tasks go to whichever member of
/// the group is currently least-loaded, and everything else falls through to
/// a shared fallback queue any idle worker can drain.
pub struct AffinityScheduler {
    queues: Vec<Mutex<VecDeque<Schedulable>>>,
    fallback: Mutex<VecDeque<Schedulable>>,
    stats: Vec<Arc<WorkerStats>>,
    default_cursor: AtomicUsize,
    numa_workers: HashMap<u32, Vec<WorkerId>>,
    numa_cursors: Mutex<HashMap<u32, usize>>,
    groups: Mutex<HashMap<String, Vec<WorkerId>>>,
}

impl AffinityScheduler {
    pub fn new(stats: Vec<Arc<WorkerStats>>) -> Self {
        let queues = stats.iter().map(|_| Mutex::new(VecDeque::new())).collect();
        let mut numa_workers: HashMap<u32, Vec<WorkerId>> = HashMap::new();
        for stat in &stats {
            if let Some(node) = stat.numa_node {
                numa_workers.entry(node).or_default().push(stat.id);
            }
        }
        Self {
            queues,
            fallback: Mutex::new(VecDeque::new()),
            stats,
            default_cursor: AtomicUsize::new(0),
            numa_workers,
            numa_cursors: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    fn default_worker(&self) -> WorkerId {
        let n = self.queues.len();
        WorkerId(self.default_cursor.fetch_add(1, Ordering::Relaxed) % n)
    }

    fn least_loaded_worker(&self) -> WorkerId {
        self.stats
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.current_task_count())
            .map(|(i, _)| WorkerId(i))
            .expect("at least one worker")
    }

    /// Picks the least-loaded member of `group`, re-evaluated on every call
    /// rather than pinned to whoever claimed the name first. The first task
    /// for a new group seeds its membership with the least-loaded worker at
    /// that moment; every worker a group's tasks have ever landed on stays a
    /// candidate member for the next placement.
    fn place_in_group(&self, group: &str) -> WorkerId {
        let mut groups = self.groups.lock();
        let members = groups.entry(group.to_string()).or_default();
        let worker = if members.is_empty() {
            self.least_loaded_worker()
        } else {
            *members
                .iter()
                .min_by_key(|w| self.stats[w.0].current_task_count())
                .expect("non-empty")
        };
        if !members.contains(&worker) {
            members.push(worker);
        }
        worker
    }

    pub fn place(&self, meta: &SchedulableMeta) -> Result<WorkerId> {
        let affinity = &meta.affinity;

        if let Some(worker) = affinity.preferred_worker {
            let stats = self.stats.get(worker.0).ok_or_else(|| {
                Error::AffinityUnsatisfiable(format!("no such worker {worker}"))
            })?;
            if stats.is_paused() && !affinity.allow_migration {
                return Err(Error::AffinityUnsatisfiable(format!(
                    "worker {worker} is paused"
                )));
            }
            return Ok(worker);
        }

        if let Some(group) = &affinity.group {
            return Ok(self.place_in_group(group));
        }

        if let Some(node) = affinity.numa_node {
            let Some(candidates) = self.numa_workers.get(&node) else {
                if affinity.allow_migration {
                    return Ok(self.default_worker());
                }
                return Err(Error::AffinityUnsatisfiable(format!(
                    "no worker bound to numa node {node}"
                )));
            };
            let mut cursors = self.numa_cursors.lock();
            let cursor = cursors.entry(node).or_insert(0);
            let worker = candidates[*cursor % candidates.len()];
            *cursor += 1;
            return Ok(worker);
        }

        Ok(self.default_worker())
    }

    /// Affinity-routed tasks (pinned/grouped/NUMA) go to their assigned
    /// worker's local queue; everything else — tasks with no affinity rule —
    /// goes to the shared fallback queue instead of a specific worker.
    pub fn enqueue(&self, item: Schedulable) {
        let affinity = &item.meta.affinity;
        let has_rule = affinity.preferred_worker.is_some()
            || affinity.group.is_some()
            || affinity.numa_node.is_some();
        if has_rule {
            let worker = item.meta.worker_id.expect("placed before enqueue");
            self.queues[worker.0].lock().push_back(item);
        } else {
            self.fallback.lock().push_back(item);
        }
    }

    pub fn next(&self, worker: WorkerId) -> Option<Schedulable> {
        if let Some(item) = self.queues[worker.0].lock().pop_front() {
            return Some(item);
        }
        self.fallback.lock().pop_front()
    }

    pub fn try_steal(&self, _worker: WorkerId) -> Option<Schedulable> {
        None
    }

    pub fn len(&self, worker: WorkerId) -> usize {
        self.queues[worker.0].lock().len() + self.fallback.lock().len()
    }
}

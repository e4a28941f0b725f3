use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle as ThreadJoinHandle;
use std::time::Duration;

use stellane_types::WorkerId;

use super::Scheduler;
use crate::task;

/// OS thread backing one scheduler worker. Owns nothing but the handle to
/// join on shutdown; all actual state (queues, stats) lives in the
/// `Scheduler` the thread loop closes over.
pub struct WorkerThread {
    pub id: WorkerId,
    handle: Option<ThreadJoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerThread {
    pub fn spawn(
        id: WorkerId,
        scheduler: Arc<Scheduler>,
        idle_timeout: Duration,
        bound_core: Option<core_affinity::CoreId>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = std::thread::Builder::new()
            .name(format!("stellane-worker-{}", id.0))
            .spawn(move || {
                if let Some(core) = bound_core {
                    core_affinity::set_for_current(core);
                }
                task::set_current_worker(Some(id));
                run_loop(id, &scheduler, &thread_shutdown, idle_timeout);
            })
            .expect("failed to spawn worker thread");

        Self {
            id,
            handle: Some(handle),
            shutdown,
        }
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const MIN_BACKOFF: Duration = Duration::from_micros(50);

fn run_loop(id: WorkerId, scheduler: &Scheduler, shutdown: &AtomicBool, idle_timeout: Duration) {
    let mut backoff = MIN_BACKOFF;
    while !shutdown.load(Ordering::Acquire) {
        if scheduler.is_paused(id) {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }

        match scheduler.next_for(id) {
            Some(item) => {
                backoff = MIN_BACKOFF;
                let stats = scheduler.stats_for(id);
                stats.task_started();
                item.run();
                stats.task_finished();
            }
            None => {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(idle_timeout.max(MIN_BACKOFF));
            }
        }
    }
}

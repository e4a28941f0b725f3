//! End-to-end scheduler scenarios: FIFO order, priority order, work-stealing
//! balance, and queue-depth backpressure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stellane_executor::{JoinHandle, Schedulable, Schedule, Scheduler};
use stellane_types::schedulable::Affinity;
use stellane_types::{Error, Priority, RuntimeConfig, SchedulableMeta, StrategyKind, WorkerId};

fn config(strategy: StrategyKind, worker_threads: usize) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.runtime.strategy = strategy;
    config.runtime.worker_threads = worker_threads;
    config
}

fn spawn_unit<F>(scheduler: &Arc<Scheduler>, priority: Priority, body: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    scheduler
        .spawn(priority, Affinity::none(), async move {
            body.await;
            Ok::<(), Error>(())
        })
        .unwrap()
}

#[test_log::test]
fn fifo_single_worker_preserves_submission_order() {
    let scheduler = Arc::new(Scheduler::new(&config(StrategyKind::Fifo, 1)));
    scheduler.start();

    let log = Arc::new(Mutex::new(String::new()));
    for ch in ['a', 'b', 'c'] {
        let log = log.clone();
        spawn_unit(&scheduler, Priority::NORMAL, async move {
            log.lock().push(ch);
        });
    }

    std::thread::sleep(Duration::from_millis(100));
    scheduler.stop();
    similar_asserts::assert_eq!(log.lock().clone(), "abc".to_string());
}

#[test_log::test]
fn priority_scheduler_dispatches_highest_priority_first() {
    let scheduler = Arc::new(Scheduler::new(&config(StrategyKind::Priority, 1)));
    scheduler.start();

    let log = Arc::new(Mutex::new(Vec::new()));
    let push = |label: &'static str| {
        let log = log.clone();
        async move { log.lock().push(label) }
    };

    spawn_unit(&scheduler, Priority(10), push("low"));
    spawn_unit(&scheduler, Priority(90), push("hi1"));
    spawn_unit(&scheduler, Priority(90), push("hi2"));
    spawn_unit(&scheduler, Priority(20), push("mid"));

    std::thread::sleep(Duration::from_millis(100));
    scheduler.stop();
    assert_eq!(*log.lock(), vec!["hi1", "hi2", "mid", "low"]);
}

/// A [`Schedule`] sink that parks every scheduled item in a `Vec` instead of
/// running it, so the resulting `Schedulable`s can be handed to
/// [`Scheduler::seed_worker`] as if they'd been placed there directly.
struct ParkingLot(Mutex<Vec<Schedulable>>);

impl Schedule for ParkingLot {
    fn schedule(&self, item: Schedulable) {
        self.0.lock().push(item);
    }
}

#[test_log::test]
fn work_stealing_balances_a_lopsided_queue() {
    const WORKERS: usize = 4;
    const TASKS: usize = 1000;

    let scheduler = Arc::new(Scheduler::new(&config(StrategyKind::WorkStealing, WORKERS)));

    let per_worker: Arc<Vec<AtomicUsize>> =
        Arc::new((0..WORKERS).map(|_| AtomicUsize::new(0)).collect());

    let parking_lot = Arc::new(ParkingLot(Mutex::new(Vec::with_capacity(TASKS))));
    for _ in 0..TASKS {
        let per_worker = per_worker.clone();
        let meta = SchedulableMeta::new(Priority::NORMAL, Affinity::none());
        stellane_executor::task::spawn(
            async move {
                std::thread::sleep(Duration::from_millis(1));
                let worker = stellane_executor::task::current_worker()
                    .expect("task runs with a current worker set");
                per_worker[worker.0].fetch_add(1, Ordering::Relaxed);
                Ok::<(), Error>(())
            },
            meta,
            parking_lot.clone(),
        )
        .detach();
    }
    let seeded = std::mem::take(&mut *parking_lot.0.lock());
    scheduler.seed_worker(WorkerId(0), seeded);

    scheduler.start();
    // Generous bound: 1000 one-ms spins across 4 workers, plus stealing
    // overhead, comfortably finishes well under this.
    std::thread::sleep(Duration::from_secs(3));
    scheduler.stop();

    let counts: Vec<usize> = per_worker.iter().map(|c| c.load(Ordering::Relaxed)).collect();
    let total: usize = counts.iter().sum();
    assert_eq!(total, TASKS, "every task must complete exactly once");
    for (worker, count) in counts.iter().enumerate() {
        assert!(
            (200..=300).contains(count),
            "worker {worker} completed {count} tasks, expected in [200, 300]"
        );
    }
}

#[test_log::test]
fn backpressure_rejects_submissions_past_the_queue_cap() {
    let mut config = config(StrategyKind::Fifo, 1);
    config.runtime.max_queue_len = Some(4);
    let scheduler = Arc::new(Scheduler::new(&config));

    let completed = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let completed = completed.clone();
        handles.push(spawn_unit(&scheduler, Priority::NORMAL, async move {
            completed.fetch_add(1, Ordering::Relaxed);
        }));
    }

    let fifth = scheduler.spawn(Priority::NORMAL, Affinity::none(), async {
        Ok::<(), Error>(())
    });
    assert!(matches!(fifth, Err(Error::Backpressure(_))));

    scheduler.start();
    std::thread::sleep(Duration::from_millis(100));
    scheduler.stop();
    assert_eq!(completed.load(Ordering::Relaxed), 4);
    assert!(handles.iter().all(|h| h.is_finished()));
}

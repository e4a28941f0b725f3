//! End-to-end timer scenarios: ordering of overlapping deadlines, and
//! `with_timeout`'s resolution window against a future that never completes
//! on its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use stellane_executor::{Core, Scheduler, sleep_for, with_timeout};
use stellane_types::schedulable::Affinity;
use stellane_types::{BackendKind, Error, Priority, Result, RuntimeConfig, StrategyKind};

fn single_worker_fifo() -> Arc<Scheduler> {
    let mut config = RuntimeConfig::default();
    config.runtime.strategy = StrategyKind::Fifo;
    config.runtime.worker_threads = 1;
    Arc::new(Scheduler::new(&config))
}

/// Spawns the reactor thread a `Runtime` would normally own, so timers
/// registered on `core`'s driver actually fire.
fn spawn_reactor(core: Arc<Core>) -> (std::thread::JoinHandle<()>, Arc<Core>) {
    let handle_core = core.clone();
    let handle = std::thread::spawn(move || {
        handle_core.run(Duration::from_millis(2), |_| {});
    });
    (handle, core)
}

#[test_log::test]
fn later_submitted_shorter_timer_fires_first() {
    let core = Arc::new(Core::new(BackendKind::CrossPlatform).unwrap());
    let timers = core.timers();
    let (reactor, core) = spawn_reactor(core);

    let scheduler = single_worker_fifo();
    scheduler.start();

    let log: Arc<Mutex<Vec<(&'static str, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let log_a = log.clone();
    let timers_a = timers.clone();
    scheduler
        .spawn(Priority::NORMAL, Affinity::none(), async move {
            sleep_for(timers_a, Duration::from_millis(50)).await;
            log_a.lock().push(("cb_A", start.elapsed()));
            Ok::<(), Error>(())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(10));

    let log_b = log.clone();
    let timers_b = timers.clone();
    scheduler
        .spawn(Priority::NORMAL, Affinity::none(), async move {
            sleep_for(timers_b, Duration::from_millis(30)).await;
            log_b.lock().push(("cb_B", start.elapsed()));
            Ok::<(), Error>(())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(150));
    scheduler.stop();
    core.stop();
    let _ = reactor.join();

    let fired = log.lock().clone();
    assert_eq!(fired.len(), 2, "both timers must fire exactly once");
    assert_eq!(fired[0].0, "cb_B");
    assert_eq!(fired[1].0, "cb_A");
    assert!(
        fired[0].1 >= Duration::from_millis(30) && fired[0].1 <= Duration::from_millis(90),
        "cb_B fired at {:?}, expected close to 40ms",
        fired[0].1
    );
    assert!(
        fired[1].1 >= Duration::from_millis(45) && fired[1].1 <= Duration::from_millis(120),
        "cb_A fired at {:?}, expected close to 50ms",
        fired[1].1
    );
}

#[test_log::test]
fn with_timeout_resolves_within_its_window_against_a_forever_pending_inner() {
    let core = Arc::new(Core::new(BackendKind::CrossPlatform).unwrap());
    let timers = core.timers();
    let (reactor, core) = spawn_reactor(core);

    let scheduler = single_worker_fifo();
    scheduler.start();

    // `inner` must be its own task (not a bare async block) so that a
    // timeout has something real to `cancel()`.
    let inner = scheduler
        .spawn(Priority::NORMAL, Affinity::none(), async {
            std::future::pending::<Result<()>>().await
        })
        .unwrap();

    let outcome: Arc<Mutex<Option<(Result<()>, Duration)>>> = Arc::new(Mutex::new(None));
    let outcome2 = outcome.clone();
    let start = Instant::now();

    scheduler
        .spawn(Priority::NORMAL, Affinity::none(), async move {
            let result = with_timeout(timers, Duration::from_millis(25), inner).await;
            *outcome2.lock() = Some((result, start.elapsed()));
            Ok::<(), Error>(())
        })
        .unwrap();

    for _ in 0..100 {
        if outcome.lock().is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    scheduler.stop();
    core.stop();
    let _ = reactor.join();

    let (result, elapsed) = outcome.lock().take().expect("with_timeout never resolved");
    assert!(matches!(result, Err(Error::Timeout)));
    assert!(
        elapsed >= Duration::from_millis(25) && elapsed <= Duration::from_millis(60),
        "with_timeout resolved after {elapsed:?}, expected within [25ms, 60ms]"
    );
}

//! End-to-end crash-recovery scenario: a request journaled and marked
//! in-flight right before a crash is replayed exactly once on restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use stellane_executor::{Scheduler, TimerDriver};
use stellane_journal::storage::MmapFileStorage;
use stellane_journal::{BoxFuture, Journal, RecoveryEngine, RequestContext};
use stellane_types::{
    JournalRotationSection, JournalState, RecoverySection, RequestFingerprint, RuntimeConfig,
};

#[test_log::test]
fn crash_mid_handler_replays_exactly_once_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let rotation = JournalRotationSection::default();
    let recovery_config = RecoverySection::default();

    let trace_id = {
        let storage = Arc::new(MmapFileStorage::open(dir.path(), &rotation).unwrap());
        let journal = Journal::new(storage, &recovery_config);
        let trace_id = journal
            .append(RequestFingerprint::new("POST", "/api/x", b"{}".to_vec()))
            .unwrap()
            .expect("POST requests are journaled by default");
        journal.mark_in_flight(trace_id).unwrap();
        trace_id
        // `journal` and its storage are dropped here without ever marking
        // the entry completed or failed — simulating a crash mid-handler.
    };

    // Restart: reopen the same directory, which replays the log-structured
    // segments back to their last-written state per trace id.
    let storage = Arc::new(MmapFileStorage::open(dir.path(), &rotation).unwrap());
    let journal = Arc::new(Journal::new(storage, &recovery_config));
    assert_eq!(journal.get(trace_id).unwrap().unwrap().state, JournalState::InFlight);

    let timers = Arc::new(TimerDriver::new());
    let mut runtime_config = RuntimeConfig::default();
    runtime_config.runtime.worker_threads = 1;
    let scheduler = Arc::new(Scheduler::new(&runtime_config));
    scheduler.start();

    let engine = Arc::new(RecoveryEngine::new(
        journal.clone(),
        scheduler.clone(),
        timers,
        recovery_config,
    ));

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen: Arc<Mutex<Option<RequestContext>>> = Arc::new(Mutex::new(None));
    let invocations2 = invocations.clone();
    let seen2 = seen.clone();
    engine.on_recover(Arc::new(
        move |ctx: RequestContext| -> BoxFuture<Result<(), String>> {
            invocations2.fetch_add(1, Ordering::SeqCst);
            *seen2.lock() = Some(ctx);
            Box::pin(async { Ok(()) })
        },
    ));

    engine.start().unwrap();

    let mut completed = false;
    for _ in 0..100 {
        if matches!(
            journal.get(trace_id).unwrap().map(|e| e.state),
            Some(JournalState::Completed)
        ) {
            completed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    scheduler.stop();

    assert!(completed, "entry never reached Completed");
    assert_eq!(invocations.load(Ordering::SeqCst), 1, "hook must run exactly once");

    let ctx = seen.lock().take().expect("hook must have recorded a context");
    assert_eq!(ctx.method, "POST");
    assert_eq!(ctx.path, "/api/x");
    assert_eq!(ctx.body, b"{}".to_vec());
}

//! The task primitive: a spawned future plus the bookkeeping the scheduler
//! and stats collector need without being generic over its output type.
//!
//! Polling and wake-driven rescheduling are delegated to `async_task`, which
//! gives us the "runnable half" / "join half" split for free. What we add on
//! top is the part specific to this runtime: lifecycle tracking
//! (`TaskMeta`), cooperative cancellation observed at suspension points, and
//! the combinators a handler actually calls (`when_all`, `when_any`,
//! `sleep_for`, `with_timeout`, `.then()/.catch()/.finally()`).

mod combinators;
mod handle;
mod instrumented;

pub use combinators::{ResultFutureExt, when_all, when_any};
pub use handle::{Cancel, JoinHandle};

use std::future::Future;
use std::sync::Arc;

use stellane_types::{Priority, Result, SchedulableMeta, TaskId, WorkerId};

use instrumented::Instrumented;

/// A unit of work paired with the bookkeeping the scheduler needs to place
/// and reschedule it. This is what actually flows through the queues in
/// `crate::scheduler`; `JoinHandle` is the caller-facing half.
pub struct Schedulable {
    pub runnable: async_task::Runnable,
    pub meta: SchedulableMeta,
}

impl Schedulable {
    /// Runs the task once. Returns `true` if the underlying future has not
    /// yet completed and was re-scheduled (i.e. it's still alive).
    pub fn run(self) -> bool {
        self.runnable.run()
    }

    pub fn priority(&self) -> Priority {
        self.meta.priority
    }
}

/// Where a spawned task's `Schedulable` halves get sent, both on first
/// submission and on every subsequent wake. Implemented once per scheduler
/// policy; see `crate::scheduler`.
pub trait Schedule: Send + Sync + 'static {
    fn schedule(&self, item: Schedulable);
}

/// Spawns `future` onto `schedule`, returning a handle the caller can poll
/// for the result. `sched_meta` has already been placed onto a worker by the
/// caller (see `crate::scheduler::Scheduler::spawn`) — this function only
/// wires up the future's lifecycle tracking and wake plumbing.
pub fn spawn<F, T, S>(future: F, sched_meta: SchedulableMeta, schedule: Arc<S>) -> JoinHandle<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
    S: Schedule,
{
    let id = TaskId::next();
    let meta = Arc::new(parking_lot::Mutex::new(stellane_types::TaskMeta::new(id, None)));
    let cancelled = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let instrumented = Instrumented::new(future, meta.clone(), cancelled.clone());

    let sched_meta_for_closure = Arc::new(parking_lot::Mutex::new(sched_meta));

    let schedule_fn = {
        let schedule = schedule.clone();
        let sched_meta_for_closure = sched_meta_for_closure.clone();
        move |runnable: async_task::Runnable| {
            let meta = sched_meta_for_closure.lock().clone();
            schedule.schedule(Schedulable { runnable, meta });
        }
    };

    let (runnable, task) = async_task::spawn(instrumented, schedule_fn);
    runnable.schedule();

    JoinHandle::new(id, task, meta, cancelled)
}

/// The worker that a currently-running task is pinned to is threaded through
/// thread-local state so combinators can read "am I allowed to migrate"
/// without plumbing it through every `Future::poll` call. Set by the worker
/// loop before driving a `Schedulable::run`.
thread_local! {
    static CURRENT_WORKER: std::cell::Cell<Option<WorkerId>> = const { std::cell::Cell::new(None) };
}

pub(crate) fn set_current_worker(id: Option<WorkerId>) {
    CURRENT_WORKER.with(|c| c.set(id));
}

pub fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(|c| c.get())
}

//! The `Runtime` façade: wires the event loop, scheduler, and journal/
//! recovery subsystems together behind the handful of entry points an
//! embedding application actually calls.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use stellane_executor::{Core, JoinHandle, Scheduler};
use stellane_journal::storage::{JournalStorage, MmapFileStorage, SledStorage};
use stellane_journal::{Journal, OutcomeSink, RecoveryEngine, RecoveryHook};
use stellane_types::schedulable::Affinity;
use stellane_types::{Priority, Result as TypesResult, RuntimeConfig, TraceId};

use crate::config;
use crate::error::Result;
use crate::signal;
use crate::stats::{self, RuntimeStats};

pub struct Runtime {
    config: RuntimeConfig,
    core: Arc<Core>,
    scheduler: Arc<Scheduler>,
    recovery: Option<Arc<RecoveryEngine>>,
    shutdown: Arc<AtomicBool>,
    reactor: Mutex<Option<std::thread::JoinHandle<()>>>,
    task_error_hook: Mutex<Option<Arc<dyn Fn(stellane_types::Error) + Send + Sync>>>,
}

impl Runtime {
    pub fn init(config: RuntimeConfig) -> Result<Self> {
        let core = Arc::new(Core::new(config.runtime.backend)?);
        let scheduler = Arc::new(Scheduler::new(&config));

        let recovery = if config.recovery.enabled {
            Some(Arc::new(build_recovery_engine(&config, &scheduler, &core)?))
        } else {
            None
        };

        Ok(Self {
            config,
            core,
            scheduler,
            recovery,
            shutdown: Arc::new(AtomicBool::new(false)),
            reactor: Mutex::new(None),
            task_error_hook: Mutex::new(None),
        })
    }

    pub fn init_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(config::from_file(path)?)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Registers the replay hook used for recovered/failed requests. A no-op
    /// if recovery is disabled in config.
    pub fn on_recover(&self, hook: RecoveryHook) {
        if let Some(recovery) = &self.recovery {
            recovery.on_recover(hook);
        }
    }

    pub fn on_recover_advanced(&self, hook: RecoveryHook) {
        if let Some(recovery) = &self.recovery {
            recovery.on_recover_advanced(hook);
        }
    }

    pub fn on_recovery_outcome(&self, sink: OutcomeSink) {
        if let Some(recovery) = &self.recovery {
            recovery.on_outcome(sink);
        }
    }

    pub fn on_task_error(&self, hook: impl Fn(stellane_types::Error) + Send + Sync + 'static) {
        *self.task_error_hook.lock() = Some(Arc::new(hook));
    }

    /// Retries a previously journaled request through the recovery path,
    /// the same one a crash-interrupted entry takes on restart (spec §4.5).
    pub fn recover(&self, trace_id: TraceId) -> Result<()> {
        match &self.recovery {
            Some(recovery) => Ok(recovery.retry(trace_id)?),
            None => Ok(()),
        }
    }

    /// Starts the worker pool, the reactor thread, the signal watcher, and
    /// (if enabled) replays any recoverable journal entries.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.scheduler.start();

        let core = self.core.clone();
        let idle_timeout = self.config.runtime.idle_timeout;
        let mut reactor = self.reactor.lock();
        if reactor.is_none() {
            let handle = std::thread::Builder::new()
                .name("stellane-reactor".into())
                .spawn(move || core.run(idle_timeout, |_event| {}))
                .expect("failed to spawn reactor thread");
            *reactor = Some(handle);
        }
        drop(reactor);

        signal::watch_for_shutdown(self.shutdown.clone());

        if let Some(recovery) = &self.recovery {
            recovery.start()?;
        }

        Ok(())
    }

    pub fn stop(&self) {
        self.scheduler.stop();
        self.core.stop();
        if let Some(handle) = self.reactor.lock().take() {
            let _ = handle.join();
        }
    }

    /// Stops this runtime (waiting up to `timeout` for its reactor thread to
    /// exit, same abandon-don't-kill grace period as [`Runtime::stop`]) and
    /// returns a freshly initialized, freshly started runtime built from
    /// `new_config`. The returned runtime has its own `Core` and `Scheduler`
    /// — it observes none of this runtime's in-memory state (in-flight
    /// tasks, timers, I/O registrations, stats) — so callers must swap their
    /// reference to the old `Arc<Runtime>` for the returned one.
    pub fn restart(self: &Arc<Self>, new_config: RuntimeConfig, timeout: Duration) -> Result<Arc<Self>> {
        self.scheduler.stop();
        self.core.stop();
        if let Some(handle) = self.reactor.lock().take() {
            if !join_with_timeout(handle, timeout) {
                tracing::warn!(?timeout, "reactor thread did not stop within grace period during restart; abandoning it");
            }
        }
        self.shutdown.store(true, Ordering::Release);

        let fresh = Arc::new(Self::init(new_config)?);
        fresh.start()?;
        Ok(fresh)
    }

    /// `true` once a termination signal has been observed; an embedding
    /// application's own main loop polls this to know when to wind down.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RuntimeStats {
        stats::snapshot(&self.scheduler)
    }

    pub fn schedule<F, T>(self: &Arc<Self>, future: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = TypesResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.schedule_with(Priority::NORMAL, Affinity::none(), future)
    }

    pub fn schedule_with_priority<F, T>(
        self: &Arc<Self>,
        priority: Priority,
        future: F,
    ) -> Result<JoinHandle<T>>
    where
        F: Future<Output = TypesResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.schedule_with(priority, Affinity::none(), future)
    }

    pub fn schedule_with_affinity<F, T>(
        self: &Arc<Self>,
        affinity: Affinity,
        future: F,
    ) -> Result<JoinHandle<T>>
    where
        F: Future<Output = TypesResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.schedule_with(Priority::NORMAL, affinity, future)
    }

    pub fn schedule_with<F, T>(
        self: &Arc<Self>,
        priority: Priority,
        affinity: Affinity,
        future: F,
    ) -> Result<JoinHandle<T>>
    where
        F: Future<Output = TypesResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let hook = self.task_error_hook.lock().clone();
        let wrapped = async move {
            let result = future.await;
            if let Err(error) = &result {
                if let Some(hook) = hook.clone() {
                    hook(clone_error(error));
                }
            }
            result
        };
        Ok(self.scheduler.spawn(priority, affinity, wrapped)?)
    }
}

/// `stellane_types::Error` doesn't derive `Clone` (it wraps `std::io::Error`,
/// which doesn't either); this reconstructs an equivalent value from the
/// display form for the error hook, which only needs to observe *that* a
/// task failed and why, not the original typed error.
fn clone_error(error: &stellane_types::Error) -> stellane_types::Error {
    stellane_types::Error::TaskPanic(error.to_string())
}

/// Joins `handle` off-thread so the wait can be bounded by `timeout`; plain
/// `JoinHandle::join` has no timeout variant. On timeout the watcher thread
/// is abandoned to finish the join on its own — matches the "running tasks
/// are not actively killed, they are abandoned" grace-period contract.
fn join_with_timeout(handle: std::thread::JoinHandle<()>, timeout: Duration) -> bool {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout).is_ok()
}

fn build_recovery_engine(
    config: &RuntimeConfig,
    scheduler: &Arc<Scheduler>,
    core: &Arc<Core>,
) -> Result<RecoveryEngine> {
    let storage: Arc<dyn JournalStorage> = match config.recovery.backend.as_str() {
        "sled" => Arc::new(SledStorage::open(&config.recovery.path)?),
        _ => Arc::new(MmapFileStorage::open(
            &config.recovery.path,
            &config.journal_rotation,
        )?),
    };
    let journal = Arc::new(Journal::new(storage, &config.recovery));
    Ok(RecoveryEngine::new(
        journal,
        scheduler.clone(),
        core.timers(),
        config.recovery.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_without_recovery_does_not_require_a_journal_path() {
        let config = RuntimeConfig::default();
        let runtime = Runtime::init(config).unwrap();
        assert!(runtime.recovery.is_none());
    }

    #[test]
    fn init_with_recovery_creates_the_journal_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.recovery.enabled = true;
        config.recovery.path = dir.path().join("journal").to_string_lossy().into_owned();
        let runtime = Runtime::init(config).unwrap();
        assert!(runtime.recovery.is_some());
    }
}

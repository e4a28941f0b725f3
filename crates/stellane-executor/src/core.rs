//! Ties a [`Backend`] and a [`TimerDriver`] into the single event loop every
//! worker pulls ticks from. There is exactly one `Core` per runtime; workers
//! never own their own backend instance, matching spec's event loop being a
//! shared subsystem rather than a per-worker resource.

use std::collections::{HashMap, HashSet};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use stellane_types::{BackendKind, Error, Interest, Result, TimerId};

use crate::backend::{self, Backend, IoSource, ReadyEvent, RegistrationId};
use crate::time::{TimerCallback, TimerDriver};

/// A function queued to run on the next tick rather than on any worker's
/// task queue — used for bookkeeping callbacks that must not compete with
/// task scheduling for a worker slot (spec's "deferred function queue").
type Deferred = Box<dyn FnOnce() + Send>;

pub struct Core {
    backend: Box<dyn Backend>,
    timers: Arc<TimerDriver>,
    deferred: Mutex<Vec<Deferred>>,
    io_wakers: Mutex<HashMap<RegistrationId, Waker>>,
    registered_fds: Mutex<HashSet<RawFd>>,
    running: AtomicBool,
}

impl Core {
    pub fn new(kind: BackendKind) -> Result<Self> {
        Ok(Self::with_backend(backend::build(kind)?))
    }

    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            timers: Arc::new(TimerDriver::new()),
            deferred: Mutex::new(Vec::new()),
            io_wakers: Mutex::new(HashMap::new()),
            registered_fds: Mutex::new(HashSet::new()),
            running: AtomicBool::new(true),
        }
    }

    pub fn timers(&self) -> Arc<TimerDriver> {
        self.timers.clone()
    }

    /// Registers I/O interest on `source`. Returns [`Error::AlreadyRegistered`]
    /// if this fd is already registered with the backend; callers must
    /// `deregister` first to re-register it with different interest.
    pub fn register(&self, source: &mut dyn IoSource, interest: Interest) -> Result<RegistrationId> {
        let fd = source.as_raw_fd();
        let mut registered = self.registered_fds.lock();
        if !registered.insert(fd) {
            return Err(Error::AlreadyRegistered);
        }
        drop(registered);
        self.backend.register(source, interest).inspect_err(|_| {
            self.registered_fds.lock().remove(&fd);
        })
    }

    pub fn reregister(
        &self,
        source: &mut dyn IoSource,
        registration: RegistrationId,
        interest: Interest,
    ) -> Result<()> {
        self.backend.reregister(source, registration, interest)
    }

    pub fn deregister(&self, source: &mut dyn IoSource, registration: RegistrationId) -> Result<()> {
        self.io_wakers.lock().remove(&registration);
        self.registered_fds.lock().remove(&source.as_raw_fd());
        self.backend.deregister(source, registration)
    }

    /// Records the waker to invoke the next time `registration` fires.
    /// Overwrites whatever waker (if any) was previously parked there, so a
    /// future re-polled with a new waker after a spurious wakeup doesn't
    /// leak the stale one.
    pub fn park_io_waker(&self, registration: RegistrationId, waker: Waker) {
        self.io_wakers.lock().insert(registration, waker);
    }

    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        self.deferred.lock().push(Box::new(f));
    }

    /// Registers a one-shot callback timer: `cb` runs once, on a reactor
    /// thread's `tick`, the first time `delay` has elapsed.
    pub fn create_timer(&self, delay: Duration, cb: TimerCallback) -> TimerId {
        self.timers.register_callback(Instant::now() + delay, None, cb)
    }

    /// Registers a repeating callback timer: `cb` runs every `interval`,
    /// reinserted with `fire_time = now + interval` after each firing, until
    /// [`Core::cancel_timer`] is called.
    pub fn create_repeating_timer(&self, interval: Duration, cb: TimerCallback) -> TimerId {
        self.timers
            .register_callback(Instant::now() + interval, Some(interval), cb)
    }

    pub fn cancel_timer(&self, id: TimerId) {
        self.timers.cancel(id);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs exactly one iteration: drains deferred callbacks, advances the
    /// timer wheel, then polls the backend for I/O readiness and wakes
    /// whatever registrations fired. `budget` caps how long the backend poll
    /// may block when nothing else is pending.
    pub fn tick(&self, budget: Duration) -> Vec<ReadyEvent> {
        for f in self.deferred.lock().drain(..) {
            f();
        }

        let next_deadline = self.timers.turn(Instant::now());
        let timeout = match next_deadline {
            Some(deadline) => {
                let until = deadline.saturating_duration_since(Instant::now());
                Some(until.min(budget))
            }
            None => Some(budget),
        };

        let events = match self.backend.poll(timeout) {
            Ok(events) => events,
            Err(error) => {
                tracing::warn!(%error, "event loop backend poll failed");
                Vec::new()
            }
        };

        let mut wakers = self.io_wakers.lock();
        for event in &events {
            if let Some(waker) = wakers.remove(&event.registration) {
                waker.wake();
            }
        }
        drop(wakers);

        events
    }

    /// Runs [`Core::tick`] in a loop on the calling thread until
    /// [`Core::stop`] is called. Intended to be the body of the dedicated
    /// reactor thread the runtime spawns alongside its worker pool.
    pub fn run(&self, idle_timeout: Duration, on_ready: impl Fn(ReadyEvent)) {
        while self.is_running() {
            for event in self.tick(idle_timeout) {
                on_ready(event);
            }
        }
    }
}

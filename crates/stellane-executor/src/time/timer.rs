//! Timer heap. Cancellation is lazy: cancelling a timer bumps the slot's
//! generation rather than removing its entry from the heap, so `cancel` is
//! O(1) and expired-but-stale entries are simply discarded when popped (see
//! the design note on avoiding O(n) heap deletion for timer cancellation).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::task::Waker;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use stellane_types::TimerId;

/// A callback registered via [`TimerDriver::register_callback`]. Shared via
/// `Arc` rather than `Box` so a repeating timer's callback can be cloned
/// into its reinserted heap entry without re-boxing.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

enum Action {
    Wake(Waker),
    Callback(TimerCallback, Option<Duration>),
}

struct Entry {
    deadline: Instant,
    slot: u64,
    generation: u64,
    action: Action,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap, we want the earliest
        // deadline on top.
        other.deadline.cmp(&self.deadline)
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Core {
    heap: BinaryHeap<Entry>,
    generations: HashMap<u64, u64>,
}

pub struct TimerDriver {
    next_slot: AtomicU64,
    core: Mutex<Core>,
}

impl Default for TimerDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerDriver {
    pub fn new() -> Self {
        Self {
            next_slot: AtomicU64::new(1),
            core: Mutex::new(Core::default()),
        }
    }

    /// Registers a wake-up at `deadline`. `waker` is invoked (and removed)
    /// the first time [`TimerDriver::turn`] observes `deadline` has passed,
    /// unless the timer was cancelled first.
    pub fn register(&self, deadline: Instant, waker: Waker) -> TimerId {
        let slot = self.next_slot.fetch_add(1, AtomicOrdering::Relaxed);
        let mut core = self.core.lock();
        core.generations.insert(slot, 0);
        core.heap.push(Entry {
            deadline,
            slot,
            generation: 0,
            action: Action::Wake(waker),
        });
        TimerId::new(slot, 0)
    }

    /// Re-registers an existing timer with a new deadline and waker,
    /// invalidating any heap entry left over from its previous deadline.
    pub fn reset(&self, id: TimerId, deadline: Instant, waker: Waker) -> TimerId {
        let mut core = self.core.lock();
        let generation = core.generations.get(&id.slot()).copied().unwrap_or(0) + 1;
        core.generations.insert(id.slot(), generation);
        core.heap.push(Entry {
            deadline,
            slot: id.slot(),
            generation,
            action: Action::Wake(waker),
        });
        TimerId::new(id.slot(), generation)
    }

    /// Registers a callback-driven timer (`Core::create_timer` /
    /// `create_repeating_timer`): one-shot when `interval` is `None`,
    /// otherwise reinserted with `fire_time = now + interval` every time it
    /// fires, until cancelled.
    pub fn register_callback(
        &self,
        deadline: Instant,
        interval: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerId {
        let slot = self.next_slot.fetch_add(1, AtomicOrdering::Relaxed);
        let mut core = self.core.lock();
        core.generations.insert(slot, 0);
        core.heap.push(Entry {
            deadline,
            slot,
            generation: 0,
            action: Action::Callback(callback, interval),
        });
        TimerId::new(slot, 0)
    }

    /// Cancels a pending timer. Its heap entry, if any, becomes stale and is
    /// dropped without firing the next time [`TimerDriver::turn`] reaches it.
    pub fn cancel(&self, id: TimerId) {
        let mut core = self.core.lock();
        core.generations.insert(id.slot(), id.generation() + 1);
    }

    /// Pops every entry whose deadline has passed, discarding stale
    /// (cancelled or superseded) entries along the way. Repeating callback
    /// entries are reinserted under the same slot/generation with
    /// `deadline = now + interval` before anything fires, so a callback that
    /// cancels its own timer during firing is still honored on the next
    /// `turn`. Returns the deadline of the next still-pending entry, if any,
    /// so the caller can size its next blocking poll.
    pub fn turn(&self, now: Instant) -> Option<Instant> {
        let mut core = self.core.lock();
        let mut due = Vec::new();
        loop {
            match core.heap.peek() {
                Some(top) if top.deadline <= now => {
                    let entry = core.heap.pop().expect("peeked entry must pop");
                    let current = core.generations.get(&entry.slot).copied().unwrap_or(0);
                    if current != entry.generation {
                        continue;
                    }
                    if let Action::Callback(callback, Some(interval)) = &entry.action {
                        core.heap.push(Entry {
                            deadline: now + *interval,
                            slot: entry.slot,
                            generation: entry.generation,
                            action: Action::Callback(callback.clone(), Some(*interval)),
                        });
                    }
                    due.push(entry.action);
                }
                _ => break,
            }
        }
        let next = core.heap.peek().map(|e| e.deadline);
        drop(core);
        for action in due {
            match action {
                Action::Wake(waker) => waker.wake(),
                Action::Callback(callback, _) => callback(),
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_wakers_whose_deadline_has_passed() {
        let driver = TimerDriver::new();
        let (waker, woken) = test_waker();
        let past = Instant::now() - Duration::from_millis(1);
        driver.register(past, waker);
        driver.turn(Instant::now());
        assert!(woken());
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let driver = TimerDriver::new();
        let (waker, woken) = test_waker();
        let deadline = Instant::now() - Duration::from_millis(1);
        let id = driver.register(deadline, waker);
        driver.cancel(id);
        driver.turn(Instant::now());
        assert!(!woken());
    }

    fn test_waker() -> (Waker, impl Fn() -> bool) {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool;

        struct Flag(AtomicBool);
        impl std::task::Wake for Flag {
            fn wake(self: Arc<Self>) {
                self.0.store(true, AtomicOrdering::Relaxed);
            }
        }

        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let waker = Waker::from(flag.clone());
        (waker, move || flag.0.load(AtomicOrdering::Relaxed))
    }
}

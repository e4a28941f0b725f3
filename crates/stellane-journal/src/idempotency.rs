//! Idempotency window (spec §4.4): a bounded, time-windowed LRU mapping
//! idempotency-header values to the journal entry they were first observed
//! against. A duplicate key within the window makes `append` return the
//! existing trace id instead of creating a new entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use stellane_types::TraceId;

struct Record {
    trace_id: TraceId,
    seen_at: Instant,
}

/// Not a true LRU (no access-order reordering) — insertion order plus a
/// time window is all spec §4.4 asks for, and it's cheaper to maintain.
pub struct IdempotencyWindow {
    window: Duration,
    capacity: usize,
    order: Vec<String>,
    entries: HashMap<String, Record>,
}

impl IdempotencyWindow {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Returns the existing trace id if `key` was observed within the
    /// window, otherwise records `trace_id` against `key` and returns
    /// `None`.
    pub fn observe(&mut self, key: &str, trace_id: TraceId) -> Option<TraceId> {
        self.evict_expired();

        if let Some(record) = self.entries.get(key) {
            return Some(record.trace_id);
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.first().cloned() {
                self.order.remove(0);
                self.entries.remove(&oldest);
            }
        }

        self.order.push(key.to_string());
        self.entries.insert(
            key.to_string(),
            Record {
                trace_id,
                seen_at: Instant::now(),
            },
        );
        None
    }

    fn evict_expired(&mut self) {
        let window = self.window;
        let now = Instant::now();
        self.entries
            .retain(|_, record| now.duration_since(record.seen_at) < window);
        let entries = &self.entries;
        self.order.retain(|key| entries.contains_key(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_within_window_returns_existing_trace_id() {
        let mut window = IdempotencyWindow::new(Duration::from_secs(60), 16);
        let first = TraceId::new_v4();
        assert_eq!(window.observe("key-1", first), None);
        assert_eq!(window.observe("key-1", TraceId::new_v4()), Some(first));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let mut window = IdempotencyWindow::new(Duration::from_secs(60), 16);
        let a = TraceId::new_v4();
        let b = TraceId::new_v4();
        assert_eq!(window.observe("key-a", a), None);
        assert_eq!(window.observe("key-b", b), None);
        assert_eq!(window.observe("key-a", TraceId::new_v4()), Some(a));
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let mut window = IdempotencyWindow::new(Duration::from_secs(60), 2);
        let a = TraceId::new_v4();
        window.observe("a", a);
        window.observe("b", TraceId::new_v4());
        window.observe("c", TraceId::new_v4());
        // "a" was evicted to make room for "c"; a fresh observation of "a"
        // is treated as a new key, not a duplicate of the evicted one.
        assert!(window.observe("a", TraceId::new_v4()).is_none());
    }

    #[test]
    fn expired_entries_are_treated_as_new() {
        let mut window = IdempotencyWindow::new(Duration::from_millis(10), 16);
        let a = TraceId::new_v4();
        window.observe("a", a);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(window.observe("a", TraceId::new_v4()), None);
    }
}

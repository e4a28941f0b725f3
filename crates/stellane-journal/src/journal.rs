//! The request journal (spec §4.4): durability, filtering, and idempotency
//! wrapped around a pluggable [`JournalStorage`] backend.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use stellane_types::{JournalEntry, JournalState, RecoverySection, RequestFingerprint, TraceId};

use crate::error::{JournalError, Result};
use crate::filter::FilterPolicy;
use crate::idempotency::IdempotencyWindow;
use crate::storage::JournalStorage;

pub struct Journal {
    storage: Arc<dyn JournalStorage>,
    filter: FilterPolicy,
    idempotency_header: Option<String>,
    idempotency: Mutex<IdempotencyWindow>,
    max_attempts: u32,
    max_recovery_age: std::time::Duration,
}

impl Journal {
    pub fn new(storage: Arc<dyn JournalStorage>, config: &RecoverySection) -> Self {
        Self {
            storage,
            filter: FilterPolicy::from_config(config),
            idempotency_header: config.idempotency_header.clone(),
            idempotency: Mutex::new(IdempotencyWindow::new(
                config.idempotency_window,
                config.max_idempotency_entries,
            )),
            max_attempts: config.max_attempts,
            max_recovery_age: config.max_recovery_age,
        }
    }

    /// Atomically records a new `pending` entry, applying the filter policy
    /// and idempotency dedup first. Returns `None` if the request was
    /// filtered out and must not be journaled at all.
    pub fn append(&self, fingerprint: RequestFingerprint) -> Result<Option<TraceId>> {
        if !self.filter.should_journal(&fingerprint) {
            return Ok(None);
        }

        if let Some(header) = &self.idempotency_header {
            if let Some(key) = fingerprint.header(header) {
                let key = key.to_string();
                let candidate = TraceId::new_v4();
                let mut window = self.idempotency.lock();
                if let Some(existing) = window.observe(&key, candidate) {
                    return Ok(Some(existing));
                }
                let entry = JournalEntry::new(candidate, fingerprint);
                self.storage.append(&entry)?;
                return Ok(Some(candidate));
            }
        }

        let trace_id = TraceId::new_v4();
        let entry = JournalEntry::new(trace_id, fingerprint);
        self.storage.append(&entry)?;
        Ok(Some(trace_id))
    }

    pub fn mark_in_flight(&self, id: TraceId) -> Result<()> {
        self.transition(id, JournalState::InFlight)
    }

    pub fn mark_completed(&self, id: TraceId) -> Result<()> {
        self.transition(id, JournalState::Completed)
    }

    /// Marks `id` failed and bumps its attempt count. Completing any
    /// duplicate journaled under the same idempotency key also needs to
    /// close out that key, but since duplicates within the window never get
    /// their own entry (`append` returns the original id), there's nothing
    /// further to do here.
    pub fn mark_failed(&self, id: TraceId) -> Result<()> {
        let entry = self
            .storage
            .get(id)?
            .ok_or_else(|| JournalError::NotFound(id.to_string()))?;
        self.storage
            .update_state(id, JournalState::Failed, entry.attempts + 1)
    }

    fn transition(&self, id: TraceId, state: JournalState) -> Result<()> {
        let entry = self
            .storage
            .get(id)?
            .ok_or_else(|| JournalError::NotFound(id.to_string()))?;
        self.storage.update_state(id, state, entry.attempts)
    }

    pub fn get(&self, id: TraceId) -> Result<Option<JournalEntry>> {
        self.storage.get(id)
    }

    /// Entries eligible for recovery: not completed, within
    /// `max_recovery_age`, and under `max_attempts`.
    pub fn iter_recoverable(&self) -> Result<Vec<JournalEntry>> {
        let now = SystemTime::now();
        Ok(self
            .storage
            .scan()?
            .into_iter()
            .filter(|entry| {
                entry.state.is_recoverable()
                    && entry.attempts < self.max_attempts
                    && now
                        .duration_since(entry.enqueued_at)
                        .map(|age| age <= self.max_recovery_age)
                        .unwrap_or(true)
            })
            .collect())
    }

    pub fn rotate(&self) -> Result<()> {
        self.storage.rotate()
    }

    /// Alias for `rotate`: spec §4.4 names both "rotate" and "compact" as
    /// the operation that retires closed segments without blocking new
    /// appends; backends that compact in place (sled) and backends that
    /// roll to a new file (mmap) both satisfy this through the same call.
    pub fn compact(&self) -> Result<()> {
        self.storage.rotate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MmapFileStorage;

    fn journal_with(dir: &std::path::Path, config: &RecoverySection) -> Journal {
        let rotation = stellane_types::JournalRotationSection::default();
        let storage = Arc::new(MmapFileStorage::open(dir, &rotation).unwrap());
        Journal::new(storage, config)
    }

    #[test]
    fn append_mark_completed_removes_from_recoverable_set() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal_with(dir.path(), &RecoverySection::default());
        let id = journal
            .append(RequestFingerprint::new("POST", "/orders", vec![1]))
            .unwrap()
            .unwrap();
        assert_eq!(journal.iter_recoverable().unwrap().len(), 1);
        journal.mark_completed(id).unwrap();
        assert!(journal.iter_recoverable().unwrap().is_empty());
    }

    #[test]
    fn excluded_method_is_never_appended() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal_with(dir.path(), &RecoverySection::default());
        let result = journal
            .append(RequestFingerprint::new("GET", "/orders", vec![]))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn duplicate_idempotency_key_reuses_trace_id() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal_with(dir.path(), &RecoverySection::default());
        let fp1 = RequestFingerprint::new("POST", "/orders", vec![1])
            .with_header("Idempotency-Key", "abc");
        let fp2 = RequestFingerprint::new("POST", "/orders", vec![1])
            .with_header("Idempotency-Key", "abc");
        let id1 = journal.append(fp1).unwrap().unwrap();
        let id2 = journal.append(fp2).unwrap().unwrap();
        assert_eq!(id1, id2);
        assert_eq!(journal.iter_recoverable().unwrap().len(), 1);
    }

    #[test]
    fn exhausted_attempts_drop_out_of_recoverable_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RecoverySection::default();
        config.max_attempts = 1;
        let journal = journal_with(dir.path(), &config);
        let id = journal
            .append(RequestFingerprint::new("POST", "/orders", vec![1]))
            .unwrap()
            .unwrap();
        journal.mark_failed(id).unwrap();
        assert!(journal.iter_recoverable().unwrap().is_empty());
    }
}

//! Storage backends for the journal's durable log. Spec §4.4 names three
//! candidate mechanisms (mmap append-only file, log-structured KV store, SQL
//! store) behind one abstract contract; this crate implements the first two
//! to prove the trait isn't single-implementation-shaped. Each backend must
//! provide crash-atomic state transitions: after a restart, an entry is
//! observed in whatever state was most recently durably written.

mod mmap_file;
mod sled_kv;

pub use mmap_file::MmapFileStorage;
pub use sled_kv::SledStorage;

use stellane_types::{JournalEntry, JournalState, TraceId};

use crate::error::Result;

/// Durable storage for journal entries, independent of in-memory indexing
/// (idempotency lookup, filtering) which lives one layer up in `Journal`.
pub trait JournalStorage: Send + Sync {
    /// Durably writes a brand new entry. Must not return `Ok` until the
    /// backend's configured sync policy is satisfied.
    fn append(&self, entry: &JournalEntry) -> Result<()>;

    /// Overwrites the persisted state for `trace_id`. Implementations must
    /// make this crash-atomic: a reader after a crash mid-write observes
    /// either the old or the new state, never a torn mix.
    fn update_state(&self, trace_id: TraceId, state: JournalState, attempts: u32) -> Result<()>;

    fn get(&self, trace_id: TraceId) -> Result<Option<JournalEntry>>;

    /// All entries currently held, in the order the backend can produce them
    /// most cheaply. `Journal` applies the recoverability filter on top.
    fn scan(&self) -> Result<Vec<JournalEntry>>;

    /// Retires closed segments / compacts storage. Must not block new
    /// appends arriving concurrently with rotation.
    fn rotate(&self) -> Result<()>;
}

//! Request journal and crash-recovery engine: durably records mutating
//! requests as they're dispatched, and replays the ones a crash interrupted
//! once the process restarts. Built on `stellane-executor` for scheduling
//! recovery tasks and timing retries; knows nothing about HTTP wire format.

pub mod error;
pub mod filter;
pub mod idempotency;
pub mod journal;
pub mod recovery;
pub mod storage;
pub mod wire;

pub use error::{JournalError, Result};
pub use filter::FilterPolicy;
pub use idempotency::IdempotencyWindow;
pub use journal::Journal;
pub use recovery::{
    BoxFuture, OutcomeSink, RecoveryEngine, RecoveryHook, RecoveryOutcome, RecoveryPriorityMap,
    RequestContext, DEFAULT_PRESERVED_HEADERS,
};
pub use storage::{JournalStorage, MmapFileStorage, SledStorage};

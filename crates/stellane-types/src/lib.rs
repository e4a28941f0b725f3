pub mod config;
pub mod duration;
pub mod error;
pub mod ids;
pub mod io;
pub mod journal;
pub mod schedulable;
pub mod task;
pub mod worker;

pub use config::{
    AffinityMode, AffinitySection, BackendKind, JournalRotationSection, RecoverySection,
    RuntimeConfig, RuntimeSection, StrategyKind, SyncMode, WorkStealingSection,
};
pub use error::{Error, Result};
pub use ids::{TaskId, TimerId, TraceId, WorkerId};
pub use io::Interest;
pub use journal::{JournalEntry, JournalState, RequestFingerprint};
pub use schedulable::{Affinity, SchedulableMeta};
pub use task::{Priority, TaskMeta, TaskState, TaskTimestamps};
pub use worker::WorkerStats;

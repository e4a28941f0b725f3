use std::time::SystemTime;

use crate::ids::WorkerId;
use crate::task::Priority;

/// Placement preference carried alongside a task into the scheduler.
///
/// `allow_migration = false` pins the task to `preferred_worker`: if that
/// worker is paused or absent the scheduler must fail the submission with
/// `AffinityUnsatisfiable` rather than silently placing it elsewhere (spec
/// §4.3).
#[derive(Clone, Debug, Default)]
pub struct Affinity {
    pub preferred_worker: Option<WorkerId>,
    pub numa_node: Option<u32>,
    pub group: Option<String>,
    pub allow_migration: bool,
}

impl Affinity {
    pub fn none() -> Self {
        Self {
            allow_migration: true,
            ..Default::default()
        }
    }

    pub fn pinned(worker: WorkerId) -> Self {
        Self {
            preferred_worker: Some(worker),
            allow_migration: false,
            ..Default::default()
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: Some(name.into()),
            allow_migration: true,
            ..Default::default()
        }
    }
}

/// Bookkeeping fields the scheduler attaches to a task on submission,
/// independent of the task's own future/output type (see
/// `stellane_executor::scheduler::Schedulable` for the generic wrapper that
/// pairs this with the actual task).
#[derive(Clone, Debug)]
pub struct SchedulableMeta {
    pub priority: Priority,
    pub affinity: Affinity,
    pub created_at: SystemTime,
    pub scheduled_at: Option<SystemTime>,
    pub worker_id: Option<WorkerId>,
}

impl SchedulableMeta {
    pub fn new(priority: Priority, affinity: Affinity) -> Self {
        Self {
            priority,
            affinity,
            created_at: SystemTime::now(),
            scheduled_at: None,
            worker_id: None,
        }
    }
}

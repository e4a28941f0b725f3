mod engine;
mod hooks;
mod priority;

pub use engine::RecoveryEngine;
pub use hooks::{
    BoxFuture, OutcomeSink, RecoveryHook, RecoveryOutcome, RequestContext,
    DEFAULT_PRESERVED_HEADERS,
};
pub use priority::RecoveryPriorityMap;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ids::TraceId;

/// Journal entry lifecycle state (spec §3/§4.4). Transitions are monotonic:
/// `pending -> in_flight -> (completed | failed)`. `Completed` is terminal
/// and never retried; `Failed` is retry-eligible until `max_attempts` or
/// `max_recovery_age` is exceeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl JournalState {
    /// Whether a transition from `self` to `next` is a legal step.
    /// `Completed` has no legal successor. `Failed` is retry-eligible (spec
    /// §4.4/§4.5): the recovery engine picks it back up on a later attempt,
    /// so it can re-enter `InFlight` or reach `Completed` directly, but
    /// never back to `Pending`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use JournalState::*;
        matches!(
            (self, next),
            (Pending, InFlight)
                | (Pending, Completed)
                | (Pending, Failed)
                | (InFlight, Completed)
                | (InFlight, Failed)
                | (Failed, InFlight)
                | (Failed, Completed)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::Pending | Self::InFlight | Self::Failed)
    }
}

impl std::fmt::Display for JournalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in-flight"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The identifying shape of a mutating request, captured before its handler
/// runs. `headers` carries only the subset the recovery hook declared it
/// needs (spec §4.5's "preserved headers"), not the full request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFingerprint {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestFingerprint {
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One entry in the request journal's durable log (spec §3/§4.4). The actual
/// on-disk byte layout is defined in `stellane_journal::wire`; this is the
/// in-memory representation every storage backend must produce and consume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub trace_id: TraceId,
    pub fingerprint: RequestFingerprint,
    pub state: JournalState,
    pub attempts: u32,
    pub enqueued_at: SystemTime,
    pub next_eligible_at: SystemTime,
}

impl JournalEntry {
    pub fn new(trace_id: TraceId, fingerprint: RequestFingerprint) -> Self {
        let now = SystemTime::now();
        Self {
            trace_id,
            fingerprint,
            state: JournalState::Pending,
            attempts: 0,
            enqueued_at: now,
            next_eligible_at: now,
        }
    }

    pub fn age(&self) -> std::time::Duration {
        SystemTime::now()
            .duration_since(self.enqueued_at)
            .unwrap_or_default()
    }
}

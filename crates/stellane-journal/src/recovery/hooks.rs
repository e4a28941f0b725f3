//! Request context rebuilding and hook types (spec §4.5 step 3). Header
//! preservation/injection never touches HTTP wire encoding: a `RequestContext`
//! is an in-process value handed directly to a registered hook closure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use stellane_types::{RequestFingerprint, TraceId};

pub const DEFAULT_PRESERVED_HEADERS: &[&str] =
    &["Authorization", "X-User-ID", "X-Session-ID", "X-Trace-ID"];

/// The request state handed to a recovery hook: the original fingerprint's
/// preserved headers plus the recovery-specific headers injected on every
/// replay attempt.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub trace_id: TraceId,
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub attempt: u32,
    pub enqueued_at: SystemTime,
}

impl RequestContext {
    /// Builds the replay context: starts from `fingerprint`'s headers
    /// filtered down to `preserved`, then appends the two recovery-marker
    /// headers spec §4.5 names explicitly.
    pub fn rebuild(
        trace_id: TraceId,
        fingerprint: &RequestFingerprint,
        attempt: u32,
        enqueued_at: SystemTime,
        preserved: &[String],
        source: &str,
    ) -> Self {
        let headers: Vec<(String, String)> = fingerprint
            .headers
            .iter()
            .filter(|(name, _)| preserved.iter().any(|p| p.eq_ignore_ascii_case(name)))
            .cloned()
            .chain([
                ("X-Recovery-Attempt".to_string(), attempt.to_string()),
                ("X-Recovery-Source".to_string(), source.to_string()),
            ])
            .collect();

        Self {
            trace_id,
            method: fingerprint.method.clone(),
            path: fingerprint.path.clone(),
            body: fingerprint.body.clone(),
            headers,
            attempt,
            enqueued_at,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A recovery hook replays one journal entry. `Err` carries a human-readable
/// failure reason; the engine counts it as a failed attempt and retries or
/// gives up per `RecoverySection`.
pub type RecoveryHook =
    Arc<dyn Fn(RequestContext) -> BoxFuture<Result<(), String>> + Send + Sync>;

/// Final disposition of one recovery attempt sequence, handed to the
/// optional outcome callback (spec §4.5 step 5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Success { trace_id: TraceId, attempts: u32 },
    Failed { trace_id: TraceId, attempts: u32, reason: String },
}

pub type OutcomeSink = Arc<dyn Fn(RecoveryOutcome) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_keeps_only_preserved_headers_and_adds_markers() {
        let fp = RequestFingerprint::new("POST", "/orders", vec![])
            .with_header("Authorization", "Bearer t")
            .with_header("X-Custom", "drop-me");
        let ctx = RequestContext::rebuild(
            TraceId::new_v4(),
            &fp,
            2,
            SystemTime::now(),
            &["Authorization".to_string()],
            "journal-replay",
        );
        assert_eq!(ctx.header("Authorization"), Some("Bearer t"));
        assert_eq!(ctx.header("X-Custom"), None);
        assert_eq!(ctx.header("X-Recovery-Attempt"), Some("2"));
        assert_eq!(ctx.header("X-Recovery-Source"), Some("journal-replay"));
    }
}

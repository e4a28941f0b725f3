//! Recovery engine (spec §4.5): on startup, walks the journal's recoverable
//! entries and replays each one through a registered hook, backing off
//! between attempts until it succeeds, exhausts `max_attempts`, or ages out.
//! During normal operation a handler failure routes through the same
//! `retry` path rather than a separate code path.

use std::sync::Arc;

use parking_lot::Mutex;
use stellane_executor::{Scheduler, TimerDriver, sleep_for, with_timeout};
use stellane_types::schedulable::Affinity;
use stellane_types::{JournalEntry, Priority, RecoverySection, TraceId};

use crate::error::{JournalError, Result};
use crate::journal::Journal;
use crate::recovery::hooks::{OutcomeSink, RecoveryHook, RecoveryOutcome, RequestContext};
use crate::recovery::priority::RecoveryPriorityMap;

pub struct RecoveryEngine {
    journal: Arc<Journal>,
    scheduler: Arc<Scheduler>,
    timers: Arc<TimerDriver>,
    priority_map: RecoveryPriorityMap,
    config: RecoverySection,
    basic_hook: Mutex<Option<RecoveryHook>>,
    advanced_hook: Mutex<Option<RecoveryHook>>,
    outcome_sink: Mutex<Option<OutcomeSink>>,
}

impl RecoveryEngine {
    pub fn new(
        journal: Arc<Journal>,
        scheduler: Arc<Scheduler>,
        timers: Arc<TimerDriver>,
        config: RecoverySection,
    ) -> Self {
        Self {
            journal,
            scheduler,
            timers,
            priority_map: RecoveryPriorityMap::default(),
            config,
            basic_hook: Mutex::new(None),
            advanced_hook: Mutex::new(None),
            outcome_sink: Mutex::new(None),
        }
    }

    pub fn with_priority_map(mut self, map: RecoveryPriorityMap) -> Self {
        self.priority_map = map;
        self
    }

    /// Registers the basic replay hook: given the rebuilt request, replay it
    /// and report success or failure.
    pub fn on_recover(&self, hook: RecoveryHook) {
        *self.basic_hook.lock() = Some(hook);
    }

    /// Registers an advanced hook tried first; on error it falls back to the
    /// basic hook only if `fallback_to_basic` is set.
    pub fn on_recover_advanced(&self, hook: RecoveryHook) {
        *self.advanced_hook.lock() = Some(hook);
    }

    pub fn on_outcome(&self, sink: OutcomeSink) {
        *self.outcome_sink.lock() = Some(sink);
    }

    /// Walks every recoverable entry and schedules one recovery task per
    /// entry, each running its own retry loop independently. Does not block
    /// on completion; callers that need to wait join the returned handles.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        for entry in self.journal.iter_recoverable()? {
            if entry.state.is_terminal() {
                continue;
            }
            if matches!(entry.state, stellane_types::JournalState::Pending)
                && !self.config.resume_pending_requests
            {
                continue;
            }
            self.spawn_retry(entry, "journal-replay");
        }
        Ok(())
    }

    /// Routes a handler failure observed during normal operation through the
    /// same retry path a crash-recovered entry takes.
    pub fn retry(self: &Arc<Self>, trace_id: TraceId) -> Result<()> {
        let entry = self
            .journal
            .get(trace_id)?
            .ok_or_else(|| JournalError::NotFound(trace_id.to_string()))?;
        self.spawn_retry(entry, "inline-retry");
        Ok(())
    }

    fn spawn_retry(self: &Arc<Self>, entry: JournalEntry, source: &'static str) {
        let priority = self.priority_map.compute(&entry.fingerprint);
        let engine = self.clone();
        let trace_id = entry.trace_id;
        let result = self.scheduler.spawn(priority, Affinity::none(), async move {
            engine.run_retry_loop(entry, source).await;
            Ok::<(), stellane_types::Error>(())
        });
        if let Err(error) = result {
            tracing::warn!(%error, trace_id = %trace_id, "failed to schedule recovery retry");
        }
    }

    async fn run_retry_loop(self: Arc<Self>, entry: JournalEntry, source: &'static str) {
        let trace_id = entry.trace_id;
        let mut attempts = entry.attempts;

        if matches!(entry.state, stellane_types::JournalState::Pending) {
            if let Err(error) = self.journal.mark_in_flight(trace_id) {
                tracing::warn!(%error, %trace_id, "could not mark entry in-flight");
                return;
            }
        }

        loop {
            let ctx = RequestContext::rebuild(
                trace_id,
                &entry.fingerprint,
                attempts + 1,
                entry.enqueued_at,
                default_preserved_headers(),
                source,
            );

            match self.invoke_hooks(ctx).await {
                Ok(()) => {
                    let _ = self.journal.mark_completed(trace_id);
                    self.emit(RecoveryOutcome::Success {
                        trace_id,
                        attempts: attempts + 1,
                    });
                    return;
                }
                Err(reason) => {
                    attempts += 1;
                    if let Err(error) = self.journal.mark_failed(trace_id) {
                        tracing::warn!(%error, %trace_id, "could not record failed recovery attempt");
                    }

                    if attempts >= self.config.max_attempts {
                        self.emit(RecoveryOutcome::Failed {
                            trace_id,
                            attempts,
                            reason,
                        });
                        return;
                    }

                    let delay = backoff_delay(&self.config, attempts);
                    sleep_for(self.timers.clone(), delay).await;

                    if let Err(error) = self.journal.mark_in_flight(trace_id) {
                        tracing::warn!(%error, %trace_id, "could not re-mark entry in-flight for retry");
                        return;
                    }
                }
            }
        }
    }

    async fn invoke_hooks(&self, ctx: RequestContext) -> std::result::Result<(), String> {
        let advanced = self.advanced_hook.lock().clone();
        if let Some(hook) = advanced {
            match self.run_hook_with_timeout(hook, ctx.clone()).await {
                Ok(()) => return Ok(()),
                Err(_) if self.config.fallback_to_basic => {}
                Err(error) => return Err(error),
            }
        }

        let basic = self.basic_hook.lock().clone();
        let Some(hook) = basic else {
            return Err("no recovery hook registered".to_string());
        };
        self.run_hook_with_timeout(hook, ctx).await
    }

    /// Runs `hook` as its own task so a timeout has something it can
    /// actually `cancel()` — racing a bare async block against the timer
    /// would leave the loser merely dropped, never transitioning to
    /// `Cancelled`.
    async fn run_hook_with_timeout(
        &self,
        hook: RecoveryHook,
        ctx: RequestContext,
    ) -> std::result::Result<(), String> {
        let handle = self
            .scheduler
            .spawn(Priority::NORMAL, Affinity::none(), async move {
                hook(ctx)
                    .await
                    .map_err(stellane_types::Error::RecoveryHookFailed)
            })
            .map_err(|error| error.to_string())?;

        with_timeout(self.timers.clone(), self.config.hook_timeout, handle)
            .await
            .map_err(|error| error.to_string())
    }

    fn emit(&self, outcome: RecoveryOutcome) {
        if let Some(sink) = self.outcome_sink.lock().clone() {
            sink(outcome);
        }
    }
}

fn default_preserved_headers() -> &'static [String] {
    use std::sync::OnceLock;
    static HEADERS: OnceLock<Vec<String>> = OnceLock::new();
    HEADERS.get_or_init(|| {
        crate::recovery::hooks::DEFAULT_PRESERVED_HEADERS
            .iter()
            .map(|s| s.to_string())
            .collect()
    })
}

fn backoff_delay(config: &RecoverySection, attempts: u32) -> std::time::Duration {
    let exponent = attempts.saturating_sub(1) as i32;
    let scaled = config.retry_backoff.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    std::time::Duration::from_secs_f64(scaled).min(config.max_retry_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let config = RecoverySection {
            retry_backoff: std::time::Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_retry_delay: std::time::Duration::from_millis(350),
            ..RecoverySection::default()
        };
        assert_eq!(backoff_delay(&config, 1), std::time::Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), std::time::Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), std::time::Duration::from_millis(350));
    }
}

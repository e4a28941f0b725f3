use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use stellane_types::{Error, Result, TaskMeta, TaskState};

/// Wraps a handler future with lifecycle tracking and cooperative
/// cancellation. The cancel flag is consulted on every poll rather than
/// torn down eagerly: a task only observes cancellation at its next
/// suspension point, matching the "cancellation is cooperative" invariant.
pub struct Instrumented<F> {
    inner: F,
    meta: Arc<parking_lot::Mutex<TaskMeta>>,
    cancelled: Arc<AtomicBool>,
}

impl<F> Instrumented<F> {
    pub fn new(
        inner: F,
        meta: Arc<parking_lot::Mutex<TaskMeta>>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner,
            meta,
            cancelled,
        }
    }
}

impl<F, T> Future for Instrumented<F>
where
    F: Future<Output = Result<T>>,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` is only ever reached through this pinned
        // projection, never moved out.
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };

        if this.cancelled.load(Ordering::Acquire) {
            let mut meta = this.meta.lock();
            if !meta.state.is_terminal() {
                meta.mark_terminal(TaskState::Cancelled);
            }
            return Poll::Ready(Err(Error::Cancelled));
        }

        {
            let mut meta = this.meta.lock();
            meta.mark_started();
        }

        match inner.poll(cx) {
            Poll::Ready(result) => {
                let mut meta = this.meta.lock();
                let state = if result.is_ok() {
                    TaskState::Completed
                } else {
                    TaskState::Failed
                };
                meta.mark_terminal(state);
                Poll::Ready(result)
            }
            Poll::Pending => {
                let mut meta = this.meta.lock();
                if meta.state == TaskState::Running {
                    meta.state = TaskState::Suspended;
                }
                Poll::Pending
            }
        }
    }
}

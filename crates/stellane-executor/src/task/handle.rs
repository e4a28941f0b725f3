use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use stellane_types::{Result, TaskId, TaskMeta};

/// Something a race combinator can cooperatively cancel when it loses.
/// `with_timeout`/`when_any` call this on the losing side before dropping it
/// so the loser actually transitions to `Cancelled` instead of being
/// silently abandoned mid-poll.
pub trait Cancel {
    fn cancel(&self);
}

/// Caller-facing half of a spawned task. Awaiting it yields the task's
/// result exactly once, on its terminal transition — re-polling after
/// completion is a programmer error the same way polling a finished
/// `std::future` is.
pub struct JoinHandle<T> {
    id: TaskId,
    inner: async_task::Task<Result<T>>,
    meta: Arc<parking_lot::Mutex<TaskMeta>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(
        id: TaskId,
        inner: async_task::Task<Result<T>>,
        meta: Arc<parking_lot::Mutex<TaskMeta>>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            inner,
            meta,
            cancelled,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn meta(&self) -> TaskMeta {
        self.meta.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Requests cancellation. The task observes this at its next
    /// suspension point and resolves with `Error::Cancelled`; it does not
    /// stop mid-poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Detaches the task: it keeps running to completion but its result is
    /// discarded and no one can await it anymore.
    pub fn detach(self) {
        self.inner.detach();
    }
}

impl<T> Cancel for JoinHandle<T> {
    fn cancel(&self) {
        JoinHandle::cancel(self);
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll(cx)
    }
}


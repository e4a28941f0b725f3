use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use stellane_types::{Error, Result};

use super::handle::{Cancel, JoinHandle};

/// Waits for every handle to reach a terminal state. Resolves to the first
/// error encountered, in submission order, once every task has finished;
/// resolves to the ordered vector of outputs only if none failed.
pub fn when_all<T>(handles: Vec<JoinHandle<T>>) -> WhenAll<T> {
    WhenAll {
        slots: handles.into_iter().map(Some).collect(),
        outputs: Vec::new(),
    }
}

pub struct WhenAll<T> {
    slots: Vec<Option<JoinHandle<T>>>,
    outputs: Vec<Option<Result<T>>>,
}

impl<T> Future for WhenAll<T> {
    type Output = Result<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        if this.outputs.len() < this.slots.len() {
            this.outputs.resize_with(this.slots.len(), || None);
        }

        let mut all_done = true;
        for (slot, out) in this.slots.iter_mut().zip(this.outputs.iter_mut()) {
            if out.is_some() {
                continue;
            }
            let Some(handle) = slot.as_mut() else {
                continue;
            };
            match Pin::new(handle).poll(cx) {
                Poll::Ready(result) => {
                    *out = Some(result);
                    *slot = None;
                }
                Poll::Pending => all_done = false,
            }
        }

        if !all_done {
            return Poll::Pending;
        }

        let mut values = Vec::with_capacity(this.outputs.len());
        for out in this.outputs.drain(..) {
            match out.expect("all slots resolved") {
                Ok(v) => values.push(v),
                Err(e) => return Poll::Ready(Err(e)),
            }
        }
        Poll::Ready(Ok(values))
    }
}

/// Resolves as soon as any one handle completes, yielding its index and
/// result. Every handle that did not win is `cancel()`'d before this future
/// resolves, so losers transition to `Cancelled` rather than being abandoned
/// mid-poll.
pub fn when_any<T>(handles: Vec<JoinHandle<T>>) -> WhenAny<T> {
    WhenAny {
        slots: handles.into_iter().map(Some).collect(),
    }
}

pub struct WhenAny<T> {
    slots: Vec<Option<JoinHandle<T>>>,
}

impl<T> Future for WhenAny<T> {
    type Output = (usize, Result<T>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let mut winner = None;
        for (index, slot) in this.slots.iter_mut().enumerate() {
            let Some(handle) = slot.as_mut() else {
                continue;
            };
            if let Poll::Ready(result) = Pin::new(handle).poll(cx) {
                winner = Some((index, result));
                break;
            }
        }

        let Some((index, result)) = winner else {
            return Poll::Pending;
        };
        this.slots[index] = None;
        for slot in this.slots.iter_mut() {
            if let Some(loser) = slot.take() {
                loser.cancel();
            }
        }
        Poll::Ready((index, result))
    }
}

/// `.then()/.catch()/.finally()` continuations over any result-producing
/// future, mirroring the promise-style chaining handlers use to react to a
/// task's outcome without blocking on it inline.
pub trait ResultFutureExt<T>: Future<Output = Result<T>> + Sized {
    fn then<U, F>(self, f: F) -> Then<Self, F>
    where
        F: FnOnce(T) -> Result<U>,
    {
        Then {
            inner: self,
            f: Some(f),
        }
    }

    fn catch<F>(self, f: F) -> Catch<Self, F>
    where
        F: FnOnce(Error) -> Result<T>,
    {
        Catch {
            inner: self,
            f: Some(f),
        }
    }

    fn finally<F>(self, f: F) -> Finally<Self, F>
    where
        F: FnOnce(),
    {
        Finally {
            inner: self,
            f: Some(f),
        }
    }
}

impl<T, F> ResultFutureExt<T> for F where F: Future<Output = Result<T>> {}

pub struct Then<Fut, F> {
    inner: Fut,
    f: Option<F>,
}

impl<Fut, F, T, U> Future for Then<Fut, F>
where
    Fut: Future<Output = Result<T>>,
    F: FnOnce(T) -> Result<U>,
{
    type Output = Result<U>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };
        match inner.poll(cx) {
            Poll::Ready(Ok(value)) => {
                let f = this.f.take().expect("polled after completion");
                Poll::Ready(f(value))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct Catch<Fut, F> {
    inner: Fut,
    f: Option<F>,
}

impl<Fut, F, T> Future for Catch<Fut, F>
where
    Fut: Future<Output = Result<T>>,
    F: FnOnce(Error) -> Result<T>,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };
        match inner.poll(cx) {
            Poll::Ready(Err(e)) => {
                let f = this.f.take().expect("polled after completion");
                Poll::Ready(f(e))
            }
            other => other,
        }
    }
}

pub struct Finally<Fut, F> {
    inner: Fut,
    f: Option<F>,
}

impl<Fut, F, T> Future for Finally<Fut, F>
where
    Fut: Future<Output = Result<T>>,
    F: FnOnce(),
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        let inner = unsafe { Pin::new_unchecked(&mut this.inner) };
        let result = inner.poll(cx);
        if result.is_ready() {
            if let Some(f) = this.f.take() {
                f();
            }
        }
        result
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use stellane_types::{Error, Result, TimerId};

use super::timer::TimerDriver;
use crate::task::Cancel;

/// Future returned by [`sleep_for`]. Registers itself with the shared
/// [`TimerDriver`] on first poll and stays pending until that deadline
/// fires.
pub struct Sleep {
    driver: Arc<TimerDriver>,
    deadline: Instant,
    id: Option<TimerId>,
}

impl Sleep {
    fn new(driver: Arc<TimerDriver>, deadline: Instant) -> Self {
        Self {
            driver,
            deadline,
            id: None,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if Instant::now() >= this.deadline {
            return Poll::Ready(());
        }
        let waker = cx.waker().clone();
        this.id = Some(match this.id {
            Some(id) => this.driver.reset(id, this.deadline, waker),
            None => this.driver.register(this.deadline, waker),
        });
        Poll::Pending
    }
}

pub fn sleep_for(driver: Arc<TimerDriver>, duration: Duration) -> Sleep {
    Sleep::new(driver, Instant::now() + duration)
}

pub fn sleep_until(driver: Arc<TimerDriver>, deadline: Instant) -> Sleep {
    Sleep::new(driver, deadline)
}

/// Races `future` against a timer; resolves to `Err(Error::Timeout)` if the
/// duration elapses first. `future` is polled one final time in the same
/// step the timer fires, so a future that completes exactly at the deadline
/// still wins. On timeout, `future.cancel()` is called before this future
/// resolves, so the loser transitions to `Cancelled` instead of being
/// abandoned mid-poll.
pub struct WithTimeout<F> {
    future: F,
    sleep: Sleep,
}

pub fn with_timeout<F, T>(driver: Arc<TimerDriver>, duration: Duration, future: F) -> WithTimeout<F>
where
    F: Future<Output = Result<T>> + Cancel,
{
    WithTimeout {
        future,
        sleep: sleep_for(driver, duration),
    }
}

impl<F, T> Future for WithTimeout<F>
where
    F: Future<Output = Result<T>> + Cancel,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: neither field is moved out of; `future` may be `!Unpin`
        // so it's projected through a raw pointer rather than relying on
        // `Self: Unpin`.
        let this = unsafe { self.get_unchecked_mut() };
        let future = unsafe { Pin::new_unchecked(&mut this.future) };
        if let Poll::Ready(output) = future.poll(cx) {
            return Poll::Ready(output);
        }
        match Pin::new(&mut this.sleep).poll(cx) {
            Poll::Ready(()) => {
                this.future.cancel();
                Poll::Ready(Err(Error::Timeout))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_resolves_once_deadline_has_passed() {
        let driver = Arc::new(TimerDriver::new());
        let mut sleep = sleep_for(driver.clone(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(1));
        let waker = futures_test_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(matches!(
            Pin::new(&mut sleep).poll(&mut cx),
            Poll::Ready(())
        ));
    }

    fn futures_test_waker() -> std::task::Waker {
        struct NoopWake;
        impl std::task::Wake for NoopWake {
            fn wake(self: Arc<Self>) {}
        }
        std::task::Waker::from(Arc::new(NoopWake))
    }
}

//! Awaiting I/O readiness against the shared [`Core`]. A handler calls
//! `ready(core, &mut source, interest)` and gets back a future that
//! resolves once the backend reports the requested interest.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use stellane_types::{Interest, Result};

use crate::backend::{IoSource, RegistrationId};
use crate::core::Core;

pub struct IoReady<'s> {
    core: Arc<Core>,
    source: &'s mut dyn IoSource,
    interest: Interest,
    registration: Option<RegistrationId>,
}

pub fn ready<'s>(core: Arc<Core>, source: &'s mut dyn IoSource, interest: Interest) -> IoReady<'s> {
    IoReady {
        core,
        source,
        interest,
        registration: None,
    }
}

impl Future for IoReady<'_> {
    type Output = Result<()>;

    /// The first poll registers interest and parks; `Core::tick` removes the
    /// parked waker and wakes it exactly once the backend reports the
    /// interest fired, so any poll after the first one means the wait is
    /// over.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.registration.take() {
            None => {
                let registration = match this.core.register(this.source, this.interest) {
                    Ok(id) => id,
                    Err(e) => return Poll::Ready(Err(e)),
                };
                this.core.park_io_waker(registration, cx.waker().clone());
                this.registration = Some(registration);
                Poll::Pending
            }
            Some(registration) => {
                let _ = this.core.deregister(this.source, registration);
                Poll::Ready(Ok(()))
            }
        }
    }
}

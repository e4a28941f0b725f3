use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use io_uring::{IoUring, opcode, types};
use parking_lot::Mutex;
use stellane_types::{Error, Interest, Result};

use super::{Backend, IoSource, ReadyEvent, RegistrationId};

const POLLIN: u32 = 0x001;
const POLLOUT: u32 = 0x004;

fn poll_mask(interest: Interest) -> u32 {
    let mut mask = 0;
    if interest.readable || interest.accept {
        mask |= POLLIN;
    }
    if interest.writable || interest.connect {
        mask |= POLLOUT;
    }
    mask
}

/// Completion-ring backend: readiness is observed through io_uring's
/// `IORING_OP_POLL_ADD` rather than epoll, which lets the same reactor loop
/// eventually grow into submitting real read/write SQEs without a second
/// abstraction layer. For now every registration is poll-based and, like
/// [`super::ReadinessLinuxBackend`], oneshot: a completion consumes the
/// entry and `reregister` resubmits it.
pub struct CompletionLinuxBackend {
    ring: Mutex<IoUring>,
    next_user_data: AtomicU64,
    fds: Mutex<HashMap<u64, RawFd>>,
}

impl CompletionLinuxBackend {
    pub fn new() -> Result<Self> {
        let ring = IoUring::new(256).map_err(Error::IoFailure)?;
        Ok(Self {
            ring: Mutex::new(ring),
            next_user_data: AtomicU64::new(1),
            fds: Mutex::new(HashMap::new()),
        })
    }

    fn submit_poll(&self, user_data: u64, fd: RawFd, interest: Interest) -> Result<()> {
        let entry = opcode::PollAdd::new(types::Fd(fd), poll_mask(interest))
            .build()
            .user_data(user_data);
        let mut ring = self.ring.lock();
        // SAFETY: `fd` stays valid for the lifetime of the submission because
        // the caller (the reactor) only deregisters after observing a
        // completion or explicitly cancelling.
        unsafe {
            ring.submission()
                .push(&entry)
                .map_err(|e| Error::BackendUnavailable(e.to_string()))?;
        }
        ring.submit().map_err(Error::IoFailure)?;
        Ok(())
    }
}

impl Backend for CompletionLinuxBackend {
    fn register(&self, source: &mut dyn IoSource, interest: Interest) -> Result<RegistrationId> {
        let fd = source.as_raw_fd();
        let user_data = self.next_user_data.fetch_add(1, Ordering::Relaxed);
        self.fds.lock().insert(user_data, fd);
        self.submit_poll(user_data, fd, interest)?;
        Ok(RegistrationId(user_data as usize))
    }

    fn reregister(
        &self,
        _source: &mut dyn IoSource,
        registration: RegistrationId,
        interest: Interest,
    ) -> Result<()> {
        let user_data = registration.0 as u64;
        let fd = *self
            .fds
            .lock()
            .get(&user_data)
            .ok_or_else(|| Error::BackendUnavailable("unknown registration".into()))?;
        self.submit_poll(user_data, fd, interest)
    }

    fn deregister(&self, _source: &mut dyn IoSource, registration: RegistrationId) -> Result<()> {
        self.fds.lock().remove(&(registration.0 as u64));
        Ok(())
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<Vec<ReadyEvent>> {
        let mut ring = self.ring.lock();
        // The ring itself carries no notion of "wait up to N ms with zero
        // pending completions"; a zero timeout degrades to a non-blocking
        // drain and anything else blocks for at least one completion. Timer
        // precision for idle workers comes from `TimerDriver`, not this call.
        let wait = if timeout == Some(Duration::ZERO) {
            ring.submit()
        } else {
            ring.submit_and_wait(1)
        };
        match wait {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(Error::IoFailure(e)),
        }

        let completions: Vec<_> = ring.completion().collect();
        let mut out = Vec::with_capacity(completions.len());
        for cqe in completions {
            let revents = cqe.result().max(0) as u32;
            out.push(ReadyEvent {
                registration: RegistrationId(cqe.user_data() as usize),
                interest: Interest {
                    readable: revents & POLLIN != 0,
                    writable: revents & POLLOUT != 0,
                    accept: revents & POLLIN != 0,
                    connect: revents & POLLOUT != 0,
                    closed: cqe.result() < 0,
                    timeout: false,
                },
            });
        }
        Ok(out)
    }
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mio::{Events, Registry, Token};
use parking_lot::Mutex;
use stellane_types::{Error, Interest, Result};

use super::{Backend, IoSource, ReadyEvent, RegistrationId};

fn to_mio_interest(interest: Interest) -> Option<mio::Interest> {
    let readable = interest.readable || interest.accept;
    let writable = interest.writable || interest.connect;
    match (readable, writable) {
        (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
        (true, false) => Some(mio::Interest::READABLE),
        (false, true) => Some(mio::Interest::WRITABLE),
        (false, false) => None,
    }
}

/// Linux-only readiness backend with explicit oneshot-rearm discipline: a
/// registration fires at most once, and [`Backend::reregister`] must be
/// called before the same token is observed again. This is stricter than
/// [`super::CrossPlatformBackend`], whose registrations stay armed, and
/// matches what a single-reactor-thread-per-core design wants: no event can
/// be delivered to two workers before somebody has explicitly asked to see
/// it again.
pub struct ReadinessLinuxBackend {
    poll: Mutex<mio::Poll>,
    registry: Registry,
    next_token: AtomicUsize,
    armed: Mutex<HashSet<usize>>,
}

impl ReadinessLinuxBackend {
    pub fn new() -> Result<Self> {
        let poll = mio::Poll::new()?;
        let registry = poll.registry().try_clone()?;
        Ok(Self {
            poll: Mutex::new(poll),
            registry,
            next_token: AtomicUsize::new(1),
            armed: Mutex::new(HashSet::new()),
        })
    }
}

impl Backend for ReadinessLinuxBackend {
    fn register(&self, source: &mut dyn IoSource, interest: Interest) -> Result<RegistrationId> {
        let mio_interest = to_mio_interest(interest)
            .ok_or_else(|| Error::IoInvalid("empty interest set".into()))?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        source.register(&self.registry, Token(token), mio_interest)?;
        self.armed.lock().insert(token);
        Ok(RegistrationId(token))
    }

    fn reregister(
        &self,
        source: &mut dyn IoSource,
        registration: RegistrationId,
        interest: Interest,
    ) -> Result<()> {
        let mio_interest = to_mio_interest(interest)
            .ok_or_else(|| Error::IoInvalid("empty interest set".into()))?;
        source.reregister(&self.registry, Token(registration.0), mio_interest)?;
        self.armed.lock().insert(registration.0);
        Ok(())
    }

    fn deregister(&self, source: &mut dyn IoSource, registration: RegistrationId) -> Result<()> {
        source.deregister(&self.registry)?;
        self.armed.lock().remove(&registration.0);
        Ok(())
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<Vec<ReadyEvent>> {
        let mut poll = self.poll.lock();
        let mut events = Events::with_capacity(1024);
        match poll.poll(&mut events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }
        drop(poll);

        let mut armed = self.armed.lock();
        Ok(events
            .iter()
            .filter(|event| armed.remove(&event.token().0))
            .map(|event| ReadyEvent {
                registration: RegistrationId(event.token().0),
                interest: Interest {
                    readable: event.is_readable(),
                    writable: event.is_writable(),
                    accept: event.is_readable(),
                    connect: event.is_writable(),
                    closed: event.is_read_closed() || event.is_write_closed(),
                    timeout: false,
                },
            })
            .collect())
    }
}

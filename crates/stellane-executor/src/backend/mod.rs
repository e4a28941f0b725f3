//! Event loop backends. Each implements readiness-style I/O multiplexing
//! behind the same [`Backend`] trait, whether the underlying mechanism is
//! cross-platform polling, edge-triggered epoll, or an io_uring completion
//! ring presented through its `POLL_ADD` opcode. The concrete backend is
//! chosen once at startup from `BackendKind` and never swapped at runtime,
//! so a `Box<dyn Backend>` behind the reactor is fine: this isn't a
//! per-task hot path the way scheduler dispatch is.

mod cross_platform;
mod readiness_linux;

#[cfg(all(target_os = "linux", feature = "io-uring-backend"))]
mod completion_linux;

pub use cross_platform::CrossPlatformBackend;
pub use readiness_linux::ReadinessLinuxBackend;

#[cfg(all(target_os = "linux", feature = "io-uring-backend"))]
pub use completion_linux::CompletionLinuxBackend;

use std::time::Duration;

use stellane_types::{BackendKind, Interest, Result};

/// A source the backend can register interest on. Requires `AsRawFd` in
/// addition to `mio::event::Source` so the io_uring completion backend can
/// submit `POLL_ADD` entries against the same source without a separate
/// trait hierarchy; this scopes the crate's I/O backends to Unix targets,
/// consistent with the deployment target for the completion-ring backend.
pub trait IoSource: mio::event::Source + std::os::fd::AsRawFd {}
impl<T: mio::event::Source + std::os::fd::AsRawFd> IoSource for T {}

/// Opaque registration handle; backends are free to interpret the inner
/// value however suits their mechanism (an `mio::Token`, an io_uring
/// `user_data`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub usize);

/// One readiness notification observed during a backend poll.
#[derive(Clone, Copy, Debug)]
pub struct ReadyEvent {
    pub registration: RegistrationId,
    pub interest: Interest,
}

pub trait Backend: Send + Sync {
    /// Registers `source` for `interest`, returning a handle used later to
    /// deregister it. Some backends (readiness-oneshot) consume the
    /// registration on first firing and require [`Backend::reregister`]
    /// to observe further events.
    fn register(&self, source: &mut dyn IoSource, interest: Interest) -> Result<RegistrationId>;

    /// Re-arms a oneshot registration. A no-op on backends that don't need
    /// it (persistent-interest backends like the default cross-platform one).
    fn reregister(
        &self,
        source: &mut dyn IoSource,
        registration: RegistrationId,
        interest: Interest,
    ) -> Result<()>;

    fn deregister(&self, source: &mut dyn IoSource, registration: RegistrationId) -> Result<()>;

    /// Blocks for up to `timeout` (or indefinitely if `None`) waiting for at
    /// least one readiness event, then drains whatever is available.
    fn poll(&self, timeout: Option<Duration>) -> Result<Vec<ReadyEvent>>;
}

pub fn build(kind: BackendKind) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::CrossPlatform => Ok(Box::new(CrossPlatformBackend::new()?)),
        BackendKind::ReadinessLinux => Ok(Box::new(ReadinessLinuxBackend::new()?)),
        #[cfg(all(target_os = "linux", feature = "io-uring-backend"))]
        BackendKind::CompletionLinux => Ok(Box::new(CompletionLinuxBackend::new()?)),
        #[cfg(not(all(target_os = "linux", feature = "io-uring-backend")))]
        BackendKind::CompletionLinux => Err(stellane_types::Error::BackendUnavailable(
            "completion-linux backend requires the io-uring-backend feature on Linux".into(),
        )),
        BackendKind::Custom | BackendKind::UserProvided => Err(stellane_types::Error::BackendUnavailable(
            "custom/user-provided backends must be supplied via Core::with_backend".into(),
        )),
    }
}

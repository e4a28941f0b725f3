use thiserror::Error;

/// Process-wide error categories for the runtime, per the category table in
/// the design's error-handling section. Each subsystem raises one of these
/// directly, or wraps a more specific error (e.g. [`crate::journal::JournalViolation`])
/// behind [`Error::Journal`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("event loop backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("event loop already running")]
    AlreadyRunning,

    #[error("runtime not initialized")]
    NotInitialized,

    #[error("backpressure: {0}")]
    Backpressure(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("invalid timer: {0}")]
    TimerInvalid(String),

    #[error("invalid I/O registration: {0}")]
    IoInvalid(String),

    #[error("fd already registered")]
    AlreadyRegistered,

    #[error("task cannot satisfy its affinity requirement: {0}")]
    AffinityUnsatisfiable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out")]
    Timeout,

    #[error("task panicked: {0}")]
    TaskPanic(String),

    #[error("journal corrupt: {0}")]
    JournalCorrupt(String),

    #[error("journal full")]
    JournalFull,

    #[error("no recovery hook registered")]
    RecoveryHookMissing,

    #[error("recovery hook failed: {0}")]
    RecoveryHookFailed(String),

    #[error("recovery exhausted after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

/// Errors raised by journal storage, filtering, and recovery. Composed into
/// `stellane_types::Error` via `#[from]` at the `stellane-runtime` boundary.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal corrupt: {0}")]
    Corrupt(String),

    #[error("journal is full")]
    Full,

    #[error("no entry with trace id {0}")]
    NotFound(String),

    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("no recovery hook registered")]
    HookMissing,

    #[error("recovery exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, JournalError>;

impl From<JournalError> for stellane_types::Error {
    fn from(e: JournalError) -> Self {
        match e {
            JournalError::Corrupt(msg) => stellane_types::Error::JournalCorrupt(msg),
            JournalError::Full => stellane_types::Error::JournalFull,
            JournalError::HookMissing => stellane_types::Error::RecoveryHookMissing,
            JournalError::Exhausted { attempts } => {
                stellane_types::Error::RecoveryExhausted { attempts }
            }
            other => stellane_types::Error::JournalCorrupt(other.to_string()),
        }
    }
}

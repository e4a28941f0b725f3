use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid env override {key}={value}: {reason}")]
    EnvOverride {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Runtime(#[from] stellane_types::Error),

    #[error(transparent)]
    Journal(#[from] stellane_journal::JournalError),
}

pub type Result<T> = std::result::Result<T, Error>;

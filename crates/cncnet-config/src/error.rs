use std::path::PathBuf;

/// Errors raised while loading or saving `config.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid RON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] ron::Error),

    /// A setting the rest of the client cannot work with.
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },

    #[error("could not determine OS configuration directory")]
    NoConfigDir,
}

use cncnet_config::ConfigError;
use cncnet_lan::LanError;
use cncnet_loading::{EngineError, SaveError};

/// Errors that stop the client before or while a lobby runs.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("cannot read the saved game: {0}")]
    Save(#[from] SaveError),

    #[error(transparent)]
    Lan(#[from] LanError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not resolve host {0:?}")]
    UnresolvedHost(String),

    #[error("could not connect to any IRC server")]
    IrcUnavailable,
}

//! Directory layout of the client.

use std::path::{Path, PathBuf};

use cncnet_config::{ConfigError, config_dir_or_default};

/// Where the client keeps its files.
pub struct AppDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Holds `cncnet.log` when file logging is on.
    pub log_dir: PathBuf,
}

impl AppDirs {
    /// Resolve directories, honouring an explicit `--config` directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if no override is given and the
    /// OS does not expose a configuration directory.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config_dir = config_dir_or_default(explicit)?;
        Ok(Self::under(config_dir))
    }

    fn under(config_dir: PathBuf) -> Self {
        Self {
            log_dir: config_dir.join("logs"),
            config_dir,
        }
    }
}

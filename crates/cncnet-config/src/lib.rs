//! Configuration system for the CnCNet lobby client.
//!
//! Settings persist to disk as a RON file. Every section defaults field by
//! field, so older files keep loading when new settings appear. CLI values
//! from [`CliArgs`] are layered on top of the loaded file.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, Mode};
pub use config::{
    Config, DebugConfig, GameConfig, IrcConfig, LanConfig, PlayerConfig, ServerEntry,
    config_dir_or_default,
};
pub use error::ConfigError;

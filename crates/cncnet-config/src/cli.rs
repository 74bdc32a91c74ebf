//! Command-line argument parsing for the lobby client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::Config;

/// CnCNet lobby client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "cncnet-client", about = "CnCNet saved-game loading lobby")]
pub struct CliArgs {
    /// Which lobby to run.
    #[command(subcommand)]
    pub mode: Mode,

    /// Player name.
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// IRC server host, tried before the configured list.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// IRC server port used with `--server`.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Game installation directory.
    #[arg(long, global = true)]
    pub game_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Lobby run mode.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Host a LAN loading lobby for the saved game in the save directory.
    LanHost,
    /// Join a LAN loading lobby hosted at the given address.
    LanJoin {
        /// Host address (with or without port).
        host: String,
    },
    /// Host a CnCNet loading lobby in an IRC channel.
    CncnetHost {
        /// Channel to create; derived from the saved game id when omitted.
        #[arg(long)]
        channel: Option<String>,
        /// Tunnel server as `address:port`.
        #[arg(long)]
        tunnel: Option<String>,
    },
    /// Join a CnCNet loading lobby channel.
    CncnetJoin {
        /// Channel to join.
        channel: String,
        /// Nickname of the host.
        host: String,
        /// Channel key, if the host set one.
        #[arg(long)]
        password: Option<String>,
    },
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref name) = args.name {
            self.player.name = name.clone();
        }
        if let Some(ref host) = args.server {
            let ports = match args.port {
                Some(port) => vec![port],
                None => vec![6667],
            };
            self.irc.servers.insert(
                0,
                crate::ServerEntry {
                    host: host.clone(),
                    display_name: host.clone(),
                    ports,
                },
            );
        }
        if let Some(ref dir) = args.game_dir {
            self.game.game_dir = dir.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

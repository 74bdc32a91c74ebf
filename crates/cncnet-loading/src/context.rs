//! Local identity and file locations of one loading session.

use std::path::PathBuf;

use cncnet_config::Config;

/// Everything the engine needs to know about the local installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Local player name.
    pub player_name: String,
    /// Game version reported in LAN advertisements.
    pub game_version: String,
    /// Game executable.
    pub executable: PathBuf,
    /// Working directory of the game process.
    pub game_dir: PathBuf,
    /// Spawn file written before launching.
    pub spawn_path: PathBuf,
    /// Saved-game descriptor copied into the spawn file.
    pub saved_spawn_path: PathBuf,
    /// Directory holding the saved games.
    pub saved_games_dir: PathBuf,
    /// Files covered by the integrity hash, relative to `game_dir`.
    pub hashed_files: Vec<PathBuf>,
}

impl SessionContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            player_name: config.player.name.clone(),
            game_version: config.game.version.clone(),
            executable: config.game.executable.clone(),
            game_dir: config.game.game_dir.clone(),
            spawn_path: config.spawn_path(),
            saved_spawn_path: config.saved_games_path().join(&config.game.saved_spawn_file),
            saved_games_dir: config.saved_games_path(),
            hashed_files: config.game.hashed_files.clone(),
        }
    }

    /// A context rooted at `game_dir` with the default file names.
    pub fn in_dir(player_name: impl Into<String>, game_dir: impl Into<PathBuf>) -> Self {
        let game_dir = game_dir.into();
        let saved_games_dir = game_dir.join("Saved Games");
        Self {
            player_name: player_name.into(),
            game_version: String::new(),
            executable: game_dir.join("game.exe"),
            spawn_path: game_dir.join("spawn.ini"),
            saved_spawn_path: saved_games_dir.join("spawnSG.ini"),
            saved_games_dir,
            game_dir,
            hashed_files: Vec::new(),
        }
    }
}

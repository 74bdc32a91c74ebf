//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "cncnet-client";
const CONFIG_FILE: &str = "config.ron";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Local player identity.
    pub player: PlayerConfig,
    /// IRC (CnCNet) connection settings.
    pub irc: IrcConfig,
    /// LAN lobby protocol settings.
    pub lan: LanConfig,
    /// Game installation and save paths.
    pub game: GameConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Local player identity used for IRC registration and lobby rosters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Player name (IRC nickname and in-game name).
    pub name: String,
    /// IRC ident sent in the `USER` command.
    pub ident: String,
    /// IRC real-name field.
    pub real_name: String,
}

/// A candidate IRC server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEntry {
    /// Host name or literal address.
    pub host: String,
    /// Name shown to the user while connecting.
    pub display_name: String,
    /// Ports to try, in order.
    pub ports: Vec<u16>,
}

/// IRC connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IrcConfig {
    /// Candidate servers, ranked by latency at connect time.
    pub servers: Vec<ServerEntry>,
    /// Pause between two queued outbound messages, in milliseconds.
    pub send_sleep_ms: u64,
    /// Per-port connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Latency probe timeout, in milliseconds.
    pub ping_timeout_ms: u64,
    /// Reconnect attempts allowed after an unintended disconnect.
    pub max_reconnect_count: u32,
    /// Wait before each reconnect attempt, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// First keep-alive ping after connecting, in seconds.
    pub keepalive_idle_secs: u64,
    /// Keep-alive ping period once traffic has been exchanged, in seconds.
    pub keepalive_interval_secs: u64,
    /// Consecutive read errors tolerated before the connection counts as lost.
    pub max_read_errors: u32,
    /// Channel joined by the lobby when none is given on the command line.
    pub default_channel: String,
}

/// LAN lobby protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanConfig {
    /// TCP port the loading-lobby host listens on.
    pub game_lobby_port: u16,
    /// UDP port the game itself uses between players.
    pub ingame_port: u16,
    /// UDP port game advertisements are broadcast to.
    pub discovery_port: u16,
    /// Byte separating fields inside a frame.
    pub data_separator: u8,
    /// Byte terminating each frame.
    pub message_separator: u8,
    /// Host drops a client silent for this many seconds.
    pub dropout_timeout_secs: u64,
    /// Client leaves when the host is silent for this many seconds.
    pub host_timeout_secs: u64,
    /// Idle time after which a keep-alive frame is sent, in seconds.
    pub keepalive_secs: u64,
    /// Period of the host's game advertisement, in seconds.
    pub advertise_interval_secs: u64,
    /// Protocol revision tag placed in advertisements.
    pub protocol_revision: String,
}

/// Game installation and save paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Game executable launched after the lobby completes.
    pub executable: PathBuf,
    /// Game installation directory; spawn files are written here.
    pub game_dir: PathBuf,
    /// Saved games directory, relative to `game_dir`.
    pub saved_games_dir: PathBuf,
    /// Generated spawn file name.
    pub spawn_file: String,
    /// Saved-game descriptor copied into the spawn file.
    pub saved_spawn_file: String,
    /// Client/game version string compared in advertisements.
    pub version: String,
    /// Files hashed for the file-integrity check, relative to `game_dir`.
    pub hashed_files: Vec<PathBuf>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the console output.
    pub file_logging: bool,
}

// --- Defaults ---

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: "Player".to_string(),
            ident: "cncnet".to_string(),
            real_name: "CnCNet Lobby Client".to_string(),
        }
    }
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                ServerEntry {
                    host: "irc.gamesurge.net".to_string(),
                    display_name: "GameSurge".to_string(),
                    ports: vec![6667, 6668, 7000],
                },
                ServerEntry {
                    host: "Burstfire.UK.EU.GameSurge.net".to_string(),
                    display_name: "GameSurge London, UK".to_string(),
                    ports: vec![6667, 6668, 7000],
                },
                ServerEntry {
                    host: "VortexServers.IL.US.GameSurge.net".to_string(),
                    display_name: "GameSurge Chicago, IL".to_string(),
                    ports: vec![6660, 6666, 6667, 6668, 6669],
                },
            ],
            send_sleep_ms: 1200,
            connect_timeout_ms: 3000,
            ping_timeout_ms: 1000,
            max_reconnect_count: 8,
            reconnect_delay_ms: 4000,
            keepalive_idle_secs: 120,
            keepalive_interval_secs: 30,
            max_read_errors: 8,
            default_channel: "#cncnet-lobby".to_string(),
        }
    }
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            game_lobby_port: 1233,
            ingame_port: 1234,
            discovery_port: 1232,
            data_separator: 0x01,
            message_separator: 0x02,
            dropout_timeout_secs: 20,
            host_timeout_secs: 20,
            keepalive_secs: 5,
            advertise_interval_secs: 10,
            protocol_revision: "RALAN1".to_string(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("gamemd-spawn.exe"),
            game_dir: PathBuf::from("."),
            saved_games_dir: PathBuf::from("Saved Games"),
            spawn_file: "spawn.ini".to_string(),
            saved_spawn_file: "spawnSG.ini".to_string(),
            version: "1.0".to_string(),
            hashed_files: vec![PathBuf::from("spawner.xdp"), PathBuf::from("INI/Rules.ini")],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the wire protocols.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.player.name.trim().is_empty() {
            return invalid("player.name", "must not be empty");
        }
        if self.player.name.contains([' ', ',', ';', ':']) {
            return invalid("player.name", "must not contain spaces or separators");
        }
        if self.irc.servers.iter().any(|s| s.ports.is_empty()) {
            return invalid("irc.servers", "every server needs at least one port");
        }
        if self.lan.data_separator == self.lan.message_separator {
            return invalid("lan.message_separator", "must differ from lan.data_separator");
        }
        Ok(())
    }

    /// Absolute path of the spawn file the game reads at launch.
    pub fn spawn_path(&self) -> PathBuf {
        self.game.game_dir.join(&self.game.spawn_file)
    }

    /// Absolute path of the saved games directory.
    pub fn saved_games_path(&self) -> PathBuf {
        self.game.game_dir.join(&self.game.saved_games_dir)
    }
}

/// Resolve the directory holding `config.ron`.
///
/// An explicit override wins; otherwise the OS configuration directory is used.
pub fn config_dir_or_default(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(4))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("game_lobby_port: 1233"));
        assert!(ron_str.contains("max_reconnect_count: 8"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(player: (name: \"Alice\"), irc: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.player.name, "Alice");
        assert_eq!(config.player.ident, "cncnet");
        assert_eq!(config.lan, LanConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.player.name = "Bob".to_string();
        config.lan.dropout_timeout_secs = 45;
        config.irc.servers.truncate(1);

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.irc.send_sleep_ms = 2500;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().irc.send_sleep_ms, 2500);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path.ends_with("config.ron")));
    }

    #[test]
    fn test_validate_rejects_protocol_breaking_settings() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.player.name = "Bad Name".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "player.name", .. })
        ));

        let mut config = Config::default();
        config.lan.message_separator = config.lan.data_separator;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "lan.message_separator", .. })
        ));
    }

    #[test]
    fn test_spawn_path_joins_game_dir() {
        let mut config = Config::default();
        config.game.game_dir = PathBuf::from("/games/ra2");
        assert_eq!(config.spawn_path(), PathBuf::from("/games/ra2/spawn.ini"));
        assert_eq!(
            config.saved_games_path(),
            PathBuf::from("/games/ra2/Saved Games")
        );
    }

    #[test]
    fn test_explicit_config_dir_wins() {
        let dir = config_dir_or_default(Some(Path::new("/tmp/cfg"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/cfg"));
    }
}

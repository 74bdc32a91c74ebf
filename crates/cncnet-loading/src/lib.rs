//! Saved-game loading lobby: the synchronisation engine, its transport seam
//! with CnCNet and LAN adapters, and the collaborators it drives (saves,
//! spawn file, launcher, file hash, statistics).

pub mod cncnet;
pub mod context;
pub mod engine;
pub mod hasher;
pub mod ini;
pub mod lan;
pub mod launcher;
pub mod options;
pub mod player;
pub mod saved_game;
pub mod spawn;
pub mod statistics;
pub mod transport;

pub use cncnet::{CncnetSettings, CncnetTransport, TunnelServer};
pub use context::SessionContext;
pub use engine::{Collaborators, EngineError, EngineState, GameLoadingSyncEngine, LobbyEvent};
pub use hasher::{FileHasher, Sha256FileHasher};
pub use ini::{IniDocument, IniError};
pub use lan::{AdvertiseSettings, LanClientTransport, LanHostTransport};
pub use launcher::{GameLauncher, LaunchError, LaunchRequest, LauncherEvent, ProcessLauncher};
pub use options::{LobbyOptions, OptionsPlayer, PayloadError, StartEntry};
pub use player::{PlayerInfo, SavedGamePlayer};
pub use saved_game::{DirectorySaveStorage, SaveError, SaveStorage, SavedGameInfo, SavedGameRoster};
pub use statistics::{InMemoryStatistics, StatisticsStore};
pub use transport::{JoinTicket, LoadingTransport, LobbyMessage, TransportError, TransportEvent};

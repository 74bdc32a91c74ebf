//! Saved-game loading lobby state machine.
//!
//! ```text
//! Idle ──start──▶ AwaitingJoin ◀──▶ Negotiating ◀──▶ AllReady ──START──▶ Loading ──exit──▶ Terminated
//! ```
//!
//! The host owns the ready flags and the save index and broadcasts the
//! consolidated options after every change; clients rebuild their player
//! list from each broadcast and only send requests to the host. The engine
//! is driven by `tick` from the frame loop and reports to the UI through
//! [`LobbyEvent`]s.

use std::collections::VecDeque;
use std::time::Instant;

use crate::context::SessionContext;
use crate::hasher::FileHasher;
use crate::ini::IniDocument;
use crate::launcher::{GameLauncher, LaunchRequest, LauncherEvent};
use crate::options::{LobbyOptions, OptionsPlayer, StartEntry};
use crate::player::{self, PlayerInfo, SavedGamePlayer};
use crate::saved_game::{SaveError, SaveStorage, SavedGameInfo, SavedGameRoster};
use crate::spawn;
use crate::statistics::StatisticsStore;
use crate::transport::{JoinTicket, LoadingTransport, LobbyMessage, TransportError, TransportEvent};

/// Lifecycle of a loading lobby, as seen by the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, `start` not called yet.
    Idle,
    /// Not every saved-game player is present.
    AwaitingJoin,
    /// Everyone is present, someone is not ready.
    Negotiating,
    /// Everyone is present and ready.
    AllReady,
    /// `START` was sent or received; the game is launching or running.
    Loading,
    /// The session is over.
    Terminated,
}

/// Output for the lobby UI, drained once per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    StateChanged(EngineState),
    /// The player list or a player's flags changed; redraw it.
    PlayersChanged,
    /// The host picked another save.
    SaveIndexChanged(usize),
    /// System text for the chat area.
    Notice(String),
    Chat {
        sender: String,
        /// Roster color index, if known.
        color: Option<i32>,
        text: String,
    },
    PlayAttentionSound,
    FlashWindow,
    /// Loading is disabled; the text says why.
    LoadBlocked(String),
    LoadUnblocked,
    /// The game process started.
    GameLaunched,
    /// The game process exited. `code` is `None` when it was killed.
    GameExited { code: Option<i32> },
    /// The session is over; the UI should close the lobby.
    Left { reason: String },
}

/// Why an engine operation was refused.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0} is not a player of the saved game")]
    NotInRoster(String),
    #[error("no saved games found")]
    NoSavedGames,
    #[error("save index {0} is out of range")]
    SaveIndexOutOfRange(usize),
    #[error("the lobby was already started")]
    AlreadyStarted,
    #[error("{0} is not in the lobby")]
    NotPresent(String),
    #[error("cannot kick yourself")]
    KickSelf,
}

#[derive(Debug, thiserror::Error)]
enum JoinRejection {
    #[error("empty name")]
    EmptyName,
    #[error("different saved game {0:?}")]
    WrongGame(String),
    #[error("name already taken")]
    Duplicate,
    #[error("lobby is full")]
    Full,
    #[error("not in the saved game")]
    NotInRoster,
    #[error("lobby is not accepting players")]
    Closed,
}

/// External services the engine drives.
pub struct Collaborators {
    pub saves: Box<dyn SaveStorage>,
    pub launcher: Box<dyn GameLauncher>,
    pub hasher: Box<dyn FileHasher>,
    pub statistics: Box<dyn StatisticsStore>,
}

/// One player's view of a saved-game loading lobby driven over `T`.
pub struct GameLoadingSyncEngine<T: LoadingTransport> {
    ctx: SessionContext,
    transport: T,
    launcher: Box<dyn GameLauncher>,
    statistics: Box<dyn StatisticsStore>,

    state: EngineState,
    descriptor: IniDocument,
    roster: SavedGameRoster,
    saved_games: Vec<SavedGameInfo>,
    save_index: usize,
    players: Vec<PlayerInfo>,
    own_hash: Option<String>,
    own_tunnel_ping: Option<i32>,
    load_blocked: Option<String>,
    launched_at: Option<Instant>,
    events: VecDeque<LobbyEvent>,
}

impl<T: LoadingTransport> GameLoadingSyncEngine<T> {
    /// Load the roster and save list and hash the local files.
    pub fn new(ctx: SessionContext, transport: T, collaborators: Collaborators) -> Result<Self, EngineError> {
        let Collaborators {
            saves,
            launcher,
            hasher,
            statistics,
        } = collaborators;

        let descriptor = saves.load_descriptor()?;
        let roster = SavedGameRoster::from_descriptor(&descriptor)?;
        if player::roster_index(&roster.players, &ctx.player_name).is_none() {
            return Err(EngineError::NotInRoster(ctx.player_name.clone()));
        }
        let saved_games = saves.list_saved_games()?;
        if saved_games.is_empty() {
            return Err(EngineError::NoSavedGames);
        }

        let own_hash = match hasher.hash_files(&ctx.game_dir, &ctx.hashed_files) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!("Failed to hash game files: {e}");
                None
            }
        };

        tracing::info!(
            "Loading lobby for game {} with {} players, {} saves",
            roster.game_id,
            roster.players.len(),
            saved_games.len()
        );

        Ok(Self {
            ctx,
            transport,
            launcher,
            statistics,
            state: EngineState::Idle,
            descriptor,
            roster,
            saved_games,
            save_index: 0,
            players: Vec::new(),
            own_hash,
            own_tunnel_ping: None,
            load_blocked: None,
            launched_at: None,
            events: VecDeque::new(),
        })
    }

    /// Enter the lobby: the host seats itself, a client announces its hash.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::AlreadyStarted);
        }

        if self.is_host() {
            let index = player::roster_index(&self.roster.players, &self.ctx.player_name).unwrap_or(0);
            self.players.push(PlayerInfo {
                ready: true,
                verified: true,
                index,
                ..PlayerInfo::new(self.ctx.player_name.clone())
            });
            self.events.push_back(LobbyEvent::PlayersChanged);
            self.set_state(EngineState::AwaitingJoin);
            self.refresh_state();
            self.broadcast_options();
            self.publish();
        } else {
            if let Some(hash) = self.own_hash.clone() {
                self.transport.send_to_host(&LobbyMessage::FileHash(hash));
            }
            self.set_state(EngineState::AwaitingJoin);
        }
        Ok(())
    }

    /// Process everything the transport and the launcher reported.
    pub fn tick(&mut self, now: Instant) {
        if matches!(self.state, EngineState::Idle | EngineState::Terminated) {
            return;
        }
        for event in self.transport.poll_events() {
            self.handle_transport_event(event);
            if self.state == EngineState::Terminated {
                return;
            }
        }
        for event in self.launcher.poll_events() {
            self.handle_launcher_event(event, now);
        }
    }

    /// The load button. Host: start if everyone is present and ready.
    /// Client: toggle the ready request.
    pub fn click_load(&mut self) {
        if !self.is_negotiating() {
            return;
        }

        if !self.is_host() {
            let ready = self.local_player().is_some_and(|p| p.ready);
            self.transport.send_to_host(&LobbyMessage::Ready(!ready));
            return;
        }

        if let Some(reason) = self.load_blocked.clone() {
            self.notice(reason);
            return;
        }
        if !player::all_present(&self.players, &self.roster.players) {
            self.notice("Not all players are present.");
            self.transport.broadcast(&LobbyMessage::NotAllPresent);
            return;
        }
        if !player::all_ready(&self.players, &self.roster.players) {
            self.notice("Not all players are ready.");
            self.events.push_back(LobbyEvent::PlayAttentionSound);
            self.events.push_back(LobbyEvent::FlashWindow);
            self.transport.broadcast(&LobbyMessage::GetReady);
            return;
        }

        self.transport.assign_endpoints(&mut self.players);
        let entries = self
            .players
            .iter()
            .map(|p| StartEntry {
                name: p.name.clone(),
                ip: p.ip_address.clone(),
                port: p.port,
            })
            .collect();
        self.transport.broadcast(&LobbyMessage::Start(entries));
        self.launch_game();
    }

    /// Host: pick the save to load.
    pub fn select_save(&mut self, index: usize) -> Result<(), EngineError> {
        if !self.is_host() {
            return Err(TransportError::NotHost.into());
        }
        if index >= self.saved_games.len() {
            return Err(EngineError::SaveIndexOutOfRange(index));
        }
        if !self.is_negotiating() || index == self.save_index {
            return Ok(());
        }
        self.save_index = index;
        self.events.push_back(LobbyEvent::SaveIndexChanged(index));
        self.broadcast_options();
        Ok(())
    }

    /// Send a chat line and show it locally once.
    pub fn send_chat(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.state == EngineState::Terminated {
            return;
        }
        let color = self.local_color();
        self.transport.send_chat(color, text);
        self.events.push_back(LobbyEvent::Chat {
            sender: self.ctx.player_name.clone(),
            color: Some(color),
            text: text.to_string(),
        });
    }

    /// Host: switch tunnels. Clears a load block on success.
    pub fn change_tunnel(&mut self, tunnel: &str) -> Result<(), EngineError> {
        if !self.is_host() {
            return Err(TransportError::NotHost.into());
        }
        self.transport.change_tunnel(tunnel)?;
        self.notice(format!("Tunnel changed to {tunnel}."));
        if self.load_blocked.take().is_some() {
            self.events.push_back(LobbyEvent::LoadUnblocked);
        }
        Ok(())
    }

    /// Host: drop a joined player from the lobby and the network session.
    pub fn kick_player(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.is_host() {
            return Err(TransportError::NotHost.into());
        }
        if name == self.ctx.player_name {
            return Err(EngineError::KickSelf);
        }
        if !self.is_negotiating() {
            return Err(EngineError::AlreadyStarted);
        }
        let Some(pos) = self.players.iter().position(|p| p.name == name) else {
            return Err(EngineError::NotPresent(name.to_string()));
        };
        tracing::info!("Kicking {name}");
        self.players.remove(pos);
        self.transport.remove_player(name);
        self.notice(format!("{name} was kicked."));
        self.roster_changed();
        Ok(())
    }

    /// Leave the session. Emits [`LobbyEvent::Left`].
    pub fn leave(&mut self) {
        self.terminate("Left the game.");
    }

    /// Take every event produced since the last call.
    pub fn drain_events(&mut self) -> Vec<LobbyEvent> {
        self.events.drain(..).collect()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_host(&self) -> bool {
        self.transport.is_host()
    }

    /// Players present in the lobby, in roster order on the host.
    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    /// Players recorded in the saved game.
    pub fn roster(&self) -> &[SavedGamePlayer] {
        &self.roster.players
    }

    /// Id of the saved game; joins naming another id are refused.
    pub fn game_id(&self) -> &str {
        &self.roster.game_id
    }

    pub fn saved_games(&self) -> &[SavedGameInfo] {
        &self.saved_games
    }

    /// Index into [`saved_games`](Self::saved_games) of the save to load.
    pub fn save_index(&self) -> usize {
        self.save_index
    }

    /// Why loading is disabled, if it is.
    pub fn load_blocked(&self) -> Option<&str> {
        self.load_blocked.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // --- Transport events ---

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::JoinRequest { ticket, name, game_id } => {
                self.handle_join(ticket, name, game_id.as_deref());
            }
            TransportEvent::PeerLeft { name } => self.handle_peer_left(&name),
            TransportEvent::AddressResolved { name, address } => {
                if let Some(p) = self.players.iter_mut().find(|p| p.name == name) {
                    p.ip_address = address;
                }
            }
            TransportEvent::Message { sender, message } => {
                if self.is_host() {
                    self.handle_client_message(&sender, message);
                } else {
                    self.handle_host_message(&sender, message);
                }
            }
            TransportEvent::Chat { sender, color, text } => {
                self.events.push_back(LobbyEvent::Chat { sender, color, text });
            }
            TransportEvent::SessionEnded { reason } => {
                if self.state == EngineState::Loading {
                    tracing::info!("Session ended while the game runs: {reason}");
                } else {
                    self.terminate(reason);
                }
            }
            TransportEvent::LoadBlocked { reason } => {
                self.load_blocked = Some(reason.clone());
                self.events.push_back(LobbyEvent::LoadBlocked(reason));
            }
            TransportEvent::LoadUnblocked => {
                if self.load_blocked.take().is_some() {
                    self.events.push_back(LobbyEvent::LoadUnblocked);
                }
            }
            TransportEvent::Notice(text) => self.notice(text),
            TransportEvent::TunnelPingMeasured(ms) => {
                tracing::debug!("Tunnel round trip {ms} ms");
                self.own_tunnel_ping = Some(ms);
                let name = self.ctx.player_name.clone();
                if let Some(p) = self.players.iter_mut().find(|p| p.name == name) {
                    p.tunnel_ping = Some(ms);
                    self.events.push_back(LobbyEvent::PlayersChanged);
                }
                self.announce_tunnel_ping();
            }
        }
    }

    /// Tell everyone in the session the local tunnel round trip.
    fn announce_tunnel_ping(&mut self) {
        if let Some(ms) = self.own_tunnel_ping
            && self.is_negotiating()
        {
            self.transport.broadcast(&LobbyMessage::TunnelPing(ms));
        }
    }

    fn handle_join(&mut self, ticket: JoinTicket, name: String, game_id: Option<&str>) {
        if !self.is_host() {
            self.transport.reject_join(ticket);
            return;
        }
        let index = match self.validate_join(&name, game_id) {
            Ok(index) => index,
            Err(reason) => {
                tracing::debug!("Rejected join from {name:?}: {reason}");
                self.transport.reject_join(ticket);
                return;
            }
        };

        let address = self.transport.accept_join(ticket).unwrap_or_default();
        tracing::info!("{name} joined from {address:?}");
        self.players.push(PlayerInfo {
            index,
            ip_address: address,
            ..PlayerInfo::new(name.clone())
        });
        self.players.sort_by_key(|p| p.index);
        self.notice(format!("{name} has joined."));
        self.roster_changed();
        self.announce_tunnel_ping();
    }

    fn validate_join(&self, name: &str, game_id: Option<&str>) -> Result<usize, JoinRejection> {
        if !self.is_negotiating() {
            return Err(JoinRejection::Closed);
        }
        if name.is_empty() {
            return Err(JoinRejection::EmptyName);
        }
        if let Some(id) = game_id
            && id != self.roster.game_id
        {
            return Err(JoinRejection::WrongGame(id.to_string()));
        }
        if self.players.iter().any(|p| p.name == name) {
            return Err(JoinRejection::Duplicate);
        }
        if self.players.len() >= self.roster.players.len() {
            return Err(JoinRejection::Full);
        }
        player::roster_index(&self.roster.players, name).ok_or(JoinRejection::NotInRoster)
    }

    fn handle_peer_left(&mut self, name: &str) {
        if !self.is_host() || name == self.ctx.player_name {
            return;
        }
        let before = self.players.len();
        self.players.retain(|p| p.name != name);
        if self.players.len() == before {
            return;
        }
        self.notice(format!("{name} has left."));
        if self.is_negotiating() {
            self.roster_changed();
        }
    }

    /// Host side: requests from a client.
    fn handle_client_message(&mut self, sender: &str, message: LobbyMessage) {
        let Some(pos) = self.players.iter().position(|p| p.name == sender) else {
            tracing::debug!("Ignoring {message:?} from non-player {sender}");
            return;
        };

        match message {
            LobbyMessage::Ready(ready) => self.set_ready(pos, ready),
            LobbyMessage::ReadyToggle => {
                let ready = !self.players[pos].ready;
                self.set_ready(pos, ready);
            }
            LobbyMessage::FileHash(hash) => {
                let verified = self.own_hash.as_deref() == Some(hash.as_str());
                self.players[pos].verified = verified;
                self.events.push_back(LobbyEvent::PlayersChanged);
                if !verified {
                    self.notice(format!("{sender} has modified game files."));
                    self.transport.broadcast(&LobbyMessage::InvalidHash(sender.to_string()));
                }
            }
            LobbyMessage::InvalidSaveIndex => {
                tracing::debug!("{sender} cannot load save {}; resending options", self.save_index);
                self.broadcast_options();
            }
            LobbyMessage::TunnelPing(ms) => {
                self.players[pos].tunnel_ping = Some(ms);
                self.events.push_back(LobbyEvent::PlayersChanged);
            }
            other => tracing::debug!("Ignoring host-only message {other:?} from {sender}"),
        }
    }

    fn set_ready(&mut self, pos: usize, ready: bool) {
        if !self.is_negotiating() || self.players[pos].ready == ready {
            return;
        }
        self.players[pos].ready = ready;
        self.events.push_back(LobbyEvent::PlayersChanged);
        self.broadcast_options();
        self.refresh_state();
    }

    /// Client side: broadcasts from the host.
    fn handle_host_message(&mut self, sender: &str, message: LobbyMessage) {
        match message {
            LobbyMessage::Options(options) => self.apply_options(options),
            LobbyMessage::Start(entries) => self.apply_start(entries),
            LobbyMessage::GetReady => {
                self.notice("The host wants to load the game but not all players are ready.");
                self.events.push_back(LobbyEvent::PlayAttentionSound);
                self.events.push_back(LobbyEvent::FlashWindow);
            }
            LobbyMessage::NotAllPresent => {
                self.notice("The host wants to load the game but not all players are present.");
            }
            LobbyMessage::InvalidHash(name) => self.notice(format!("{name} has modified game files.")),
            LobbyMessage::TunnelPing(ms) => {
                if let Some(p) = self.players.iter_mut().find(|p| p.name == sender) {
                    p.tunnel_ping = Some(ms);
                    self.events.push_back(LobbyEvent::PlayersChanged);
                }
            }
            other => tracing::debug!("Ignoring client message {other:?} from {sender}"),
        }
    }

    fn apply_options(&mut self, options: LobbyOptions) {
        if !self.is_negotiating() {
            return;
        }
        let save_index = match usize::try_from(options.save_index) {
            Ok(index) if index < self.saved_games.len() => index,
            _ => {
                tracing::warn!("Host selected unknown save index {}", options.save_index);
                self.transport.send_to_host(&LobbyMessage::InvalidSaveIndex);
                return;
            }
        };
        if let Some(stranger) = options
            .players
            .iter()
            .find(|p| player::roster_index(&self.roster.players, &p.name).is_none())
        {
            tracing::debug!("Dropping options naming unknown player {}", stranger.name);
            return;
        }

        let was_seated = self.local_player().is_some();
        let previous = std::mem::take(&mut self.players);
        for p in options.players {
            let index = player::roster_index(&self.roster.players, &p.name).unwrap_or(0);
            let tunnel_ping = if p.name == self.ctx.player_name {
                self.own_tunnel_ping
            } else {
                previous.iter().find(|old| old.name == p.name).and_then(|old| old.tunnel_ping)
            };
            self.players.push(PlayerInfo {
                ready: p.ready,
                index,
                ip_address: p.address.unwrap_or_default(),
                tunnel_ping,
                ..PlayerInfo::new(p.name)
            });
        }
        if save_index != self.save_index {
            self.save_index = save_index;
            self.events.push_back(LobbyEvent::SaveIndexChanged(save_index));
        }
        self.events.push_back(LobbyEvent::PlayersChanged);
        self.refresh_state();
        if !was_seated && self.local_player().is_some() {
            self.announce_tunnel_ping();
        }
    }

    fn apply_start(&mut self, entries: Vec<StartEntry>) {
        if !self.is_negotiating() {
            return;
        }
        if !entries.iter().any(|e| e.name == self.ctx.player_name)
            || entries
                .iter()
                .any(|e| player::roster_index(&self.roster.players, &e.name).is_none())
        {
            tracing::warn!("Dropping start message with an unexpected roster: {entries:?}");
            return;
        }

        for entry in entries {
            let pos = match self.players.iter().position(|p| p.name == entry.name) {
                Some(pos) => pos,
                None => {
                    let index = player::roster_index(&self.roster.players, &entry.name).unwrap_or(0);
                    self.players.push(PlayerInfo {
                        index,
                        ..PlayerInfo::new(entry.name.clone())
                    });
                    self.players.len() - 1
                }
            };
            self.players[pos].ip_address = entry.ip;
            self.players[pos].port = entry.port;
        }
        self.launch_game();
    }

    // --- Launch ---

    fn launch_game(&mut self) {
        self.set_state(EngineState::Loading);
        self.publish();

        let Some(save) = self.saved_games.get(self.save_index) else {
            self.terminate(format!("Save {} no longer exists.", self.save_index));
            return;
        };
        let mut document = spawn::build_spawn(
            &self.descriptor,
            &save.file_name,
            &self.ctx.player_name,
            &self.roster.players,
            &self.players,
        );
        self.transport.spawn_additions(&mut document);
        if let Err(e) = spawn::write_spawn(&self.ctx.spawn_path, &document) {
            tracing::error!("Failed to write spawn file: {e}");
            self.terminate(format!("Failed to write the spawn file: {e}"));
            return;
        }

        let request = LaunchRequest {
            executable: self.ctx.executable.clone(),
            working_dir: self.ctx.game_dir.clone(),
            args: Vec::new(),
        };
        match self.launcher.launch(&request) {
            Ok(()) => {
                self.launched_at = Some(Instant::now());
                self.events.push_back(LobbyEvent::GameLaunched);
            }
            Err(e) => {
                tracing::error!("Failed to launch the game: {e}");
                self.terminate(format!("Failed to launch the game: {e}"));
            }
        }
    }

    fn handle_launcher_event(&mut self, event: LauncherEvent, now: Instant) {
        match event {
            LauncherEvent::Started => tracing::debug!("Game process started"),
            LauncherEvent::Exited { code } => {
                if let Some(started) = self.launched_at.take() {
                    let played = now.saturating_duration_since(started);
                    if !self.statistics.add_duration(&self.roster.game_id, played) {
                        tracing::debug!("No statistics record for game {}", self.roster.game_id);
                    }
                }
                self.events.push_back(LobbyEvent::GameExited { code });
                self.terminate("The game has exited.");
            }
        }
    }

    // --- Helpers ---

    fn is_negotiating(&self) -> bool {
        matches!(
            self.state,
            EngineState::AwaitingJoin | EngineState::Negotiating | EngineState::AllReady
        )
    }

    fn local_player(&self) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.name == self.ctx.player_name)
    }

    fn local_color(&self) -> i32 {
        self.roster
            .players
            .iter()
            .find(|p| p.name == self.ctx.player_name)
            .map_or(0, |p| p.color_index)
    }

    fn roster_changed(&mut self) {
        self.events.push_back(LobbyEvent::PlayersChanged);
        self.broadcast_options();
        self.publish();
        self.refresh_state();
    }

    fn broadcast_options(&mut self) {
        if !self.is_host() {
            return;
        }
        let options = LobbyOptions {
            save_index: i32::try_from(self.save_index).unwrap_or(i32::MAX),
            players: self
                .players
                .iter()
                .map(|p| OptionsPlayer {
                    name: p.name.clone(),
                    ready: p.ready,
                    address: (!p.ip_address.is_empty()).then(|| p.ip_address.clone()),
                })
                .collect(),
        };
        self.transport.broadcast(&LobbyMessage::Options(options));
    }

    fn publish(&mut self) {
        if self.is_host() {
            let started = self.state == EngineState::Loading;
            self.transport.publish_roster(&self.players, started);
        }
    }

    fn refresh_state(&mut self) {
        if !self.is_negotiating() {
            return;
        }
        let next = if !player::all_present(&self.players, &self.roster.players) {
            EngineState::AwaitingJoin
        } else if player::all_ready(&self.players, &self.roster.players) {
            EngineState::AllReady
        } else {
            EngineState::Negotiating
        };
        self.set_state(next);
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            tracing::debug!("Loading lobby {:?} -> {:?}", self.state, state);
            self.state = state;
            self.events.push_back(LobbyEvent::StateChanged(state));
        }
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.events.push_back(LobbyEvent::Notice(text.into()));
    }

    fn terminate(&mut self, reason: impl Into<String>) {
        if self.state == EngineState::Terminated {
            return;
        }
        let reason = reason.into();
        tracing::info!("Leaving loading lobby: {reason}");
        self.transport.leave();
        self.set_state(EngineState::Terminated);
        self.events.push_back(LobbyEvent::Left { reason });
    }
}

//! The seam between the loading engine and a network session.
//!
//! The engine speaks [`LobbyMessage`]s and consumes [`TransportEvent`]s; each
//! adapter maps them onto its wire format and drops the messages its wire
//! has no frame for.

use crate::ini::IniDocument;
use crate::options::{LobbyOptions, StartEntry};
use crate::player::PlayerInfo;

/// Opaque handle of a pending join, answered with `accept_join` or
/// `reject_join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinTicket(pub u64);

/// Engine-level message between the host and its clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyMessage {
    /// Host to all: consolidated state.
    Options(LobbyOptions),
    /// Host to all: launch with these endpoints.
    Start(Vec<StartEntry>),
    /// Host to all: loading was refused because someone is not ready.
    GetReady,
    /// Host to all: loading was refused because someone is missing.
    NotAllPresent,
    /// Host to all: the named player runs modified files.
    InvalidHash(String),
    /// Client to host: requested ready state.
    Ready(bool),
    /// Client to host: flip the ready state.
    ReadyToggle,
    /// Client to host: integrity hash.
    FileHash(String),
    /// Client to host: the broadcast save index is not in the local list.
    InvalidSaveIndex,
    /// Anyone: tunnel round trip in milliseconds.
    TunnelPing(i32),
}

/// What a transport observed since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer wants to take a roster slot.
    JoinRequest {
        ticket: JoinTicket,
        name: String,
        /// Saved-game id the peer announced, when the transport carries one.
        game_id: Option<String>,
    },
    /// A peer left or was dropped.
    PeerLeft { name: String },
    /// The network learned a peer's address.
    AddressResolved { name: String, address: String },
    /// A lobby control message from `sender`. Transports only report
    /// messages the sender is allowed to send.
    Message { sender: String, message: LobbyMessage },
    /// A chat line. `color` is the sender's color index when the wire
    /// carries one.
    Chat {
        sender: String,
        color: Option<i32>,
        text: String,
    },
    /// The session is over for the local player (host gone, kicked,
    /// connection lost).
    SessionEnded { reason: String },
    /// Loading must stay disabled until the condition clears.
    LoadBlocked { reason: String },
    /// A valid tunnel is in use again.
    LoadUnblocked,
    /// Informational text for the lobby.
    Notice(String),
    /// Round trip from the local player to the tunnel, in milliseconds.
    TunnelPingMeasured(i32),
}

/// A request the transport cannot carry out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
    #[error("invalid tunnel {0:?}")]
    InvalidTunnel(String),
    #[error("only the host can do that")]
    NotHost,
}

/// A loading-lobby network session, seen from one player.
///
/// The engine calls every method from its own thread; adapters hand network
/// I/O to background tasks and never block.
pub trait LoadingTransport: Send {
    /// Whether the local player hosts the session.
    fn is_host(&self) -> bool;

    /// Host: send to every client.
    fn broadcast(&mut self, message: &LobbyMessage);

    /// Client: send to the host.
    fn send_to_host(&mut self, message: &LobbyMessage);

    /// Send a chat line to everyone else. The caller shows its own copy.
    fn send_chat(&mut self, color: i32, text: &str);

    /// Admit the peer; returns the address the transport knows for it.
    fn accept_join(&mut self, ticket: JoinTicket) -> Option<String>;

    /// Turn the peer away. Rejected peers get no reply.
    fn reject_join(&mut self, ticket: JoinTicket);

    /// Host: drop an admitted player from the network session.
    fn remove_player(&mut self, name: &str);

    /// Everything received since the last call, in arrival order.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Host: fill in `ip_address` and `port` of every player before `START`.
    fn assign_endpoints(&mut self, players: &mut [PlayerInfo]);

    /// Add transport-specific sections to the spawn file.
    fn spawn_additions(&self, _spawn: &mut IniDocument) {}

    /// Host: the roster changed; refresh whatever is advertised.
    fn publish_roster(&mut self, _players: &[PlayerInfo], _started: bool) {}

    /// Host: switch the session to another tunnel (`address:port`).
    fn change_tunnel(&mut self, _tunnel: &str) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("changing tunnels"))
    }

    /// Leave the session and release its sockets.
    fn leave(&mut self);
}

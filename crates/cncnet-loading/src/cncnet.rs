//! Loading-lobby transport over a CnCNet IRC game channel.
//!
//! Control messages are CTCP notices: broadcasts go to the channel, requests
//! to the host's nickname. Players are the channel members; the host kicks
//! anyone the engine does not admit. Addresses come from `JOIN` prefixes and
//! `WHO` replies.
//!
//! | keyword  | direction      | parameter              |
//! |----------|----------------|------------------------|
//! | `OP`     | host → all     | `saveIndex;name:ready;…` |
//! | `START`  | host → all     | `name;ip:port;…`       |
//! | `GTRDY`  | host → all     |                        |
//! | `NPRSNT` | host → all     |                        |
//! | `IHSH`   | host → all     | player name            |
//! | `CHTNL`  | host → all     | `address:port`         |
//! | `READY`  | client → host  | `0` / `1`              |
//! | `FHSH`   | client → host  | file hash              |
//! | `ISGI`   | client → host  |                        |
//! | `TNLPNG` | anyone         | milliseconds           |

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use cncnet_irc::{IrcConnection, IrcEvent, LatencyProbe, QueuedMessageType};
use cncnet_protocol::CommandTable;
use rand::Rng;
use tokio::sync::mpsc;

use crate::ini::IniDocument;
use crate::options::{self, encode_options, encode_start};
use crate::player::PlayerInfo;
use crate::transport::{JoinTicket, LoadingTransport, LobbyMessage, TransportError, TransportEvent};

/// Queue priority of lobby control messages.
const LOBBY_PRIORITY: i32 = 10;

/// How long a tunnel may take to answer a latency measurement.
const TUNNEL_PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Ports handed out for in-game traffic.
pub const GAME_PORT_RANGE: RangeInclusive<u16> = 1024..=65534;

/// A tunnel server relaying in-game traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunnelServer {
    pub address: String,
    pub port: u16,
}

impl TunnelServer {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Parse `address:port`.
    pub fn parse(text: &str) -> Option<Self> {
        let (address, port) = text.rsplit_once(':')?;
        if address.is_empty() {
            return None;
        }
        Some(Self::new(address, port.parse().ok()?))
    }
}

impl fmt::Display for TunnelServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CncnetSettings {
    /// Game channel name.
    pub channel: String,
    /// Nickname of the host.
    pub host_nick: String,
    /// The local player hosts the game.
    pub is_host: bool,
    /// Tunnel in use at start, if any.
    pub tunnel: Option<TunnelServer>,
    /// Tunnels considered valid. Empty accepts any tunnel.
    pub known_tunnels: Vec<TunnelServer>,
    /// Channel key, used again when rejoining after a reconnect.
    pub password: Option<String>,
}

enum Inbound {
    Lobby(LobbyMessage),
    ChangeTunnel(String),
}

fn ctcp_table() -> CommandTable<Vec<Inbound>> {
    let lobby = |out: &mut Vec<Inbound>, message| out.push(Inbound::Lobby(message));
    CommandTable::new(' ')
        .no_param("GTRDY", move |out: &mut Vec<Inbound>, _| lobby(out, LobbyMessage::GetReady))
        .no_param("NPRSNT", move |out: &mut Vec<Inbound>, _| {
            lobby(out, LobbyMessage::NotAllPresent);
        })
        .no_param("ISGI", move |out: &mut Vec<Inbound>, _| {
            lobby(out, LobbyMessage::InvalidSaveIndex);
        })
        .int_param("READY", move |out: &mut Vec<Inbound>, _, value| {
            lobby(out, LobbyMessage::Ready(value != 0));
        })
        .int_param("TNLPNG", move |out: &mut Vec<Inbound>, _, ms| {
            lobby(out, LobbyMessage::TunnelPing(ms));
        })
        .string_param("FHSH", move |out: &mut Vec<Inbound>, _, hash| {
            lobby(out, LobbyMessage::FileHash(hash.to_string()));
        })
        .string_param("IHSH", move |out: &mut Vec<Inbound>, _, name| {
            lobby(out, LobbyMessage::InvalidHash(name.to_string()));
        })
        .string_param("OP", move |out: &mut Vec<Inbound>, sender, payload| {
            match options::parse_options(payload) {
                Ok(o) => lobby(out, LobbyMessage::Options(o)),
                Err(e) => tracing::debug!("Malformed OP from {sender}: {e}"),
            }
        })
        .string_param("START", move |out: &mut Vec<Inbound>, sender, payload| {
            match options::parse_start(payload) {
                Ok(entries) => lobby(out, LobbyMessage::Start(entries)),
                Err(e) => tracing::debug!("Malformed START from {sender}: {e}"),
            }
        })
        .string_param("CHTNL", |out: &mut Vec<Inbound>, _, tunnel| {
            out.push(Inbound::ChangeTunnel(tunnel.to_string()));
        })
}

fn encode(message: &LobbyMessage) -> Option<(String, QueuedMessageType)> {
    let encoded = match message {
        LobbyMessage::Options(o) => (format!("OP {}", encode_options(o)), QueuedMessageType::GamePlayers),
        LobbyMessage::Start(entries) => (
            format!("START {}", encode_start(entries)),
            QueuedMessageType::GameNotification,
        ),
        LobbyMessage::GetReady => ("GTRDY".to_string(), QueuedMessageType::GameGetReady),
        LobbyMessage::NotAllPresent => ("NPRSNT".to_string(), QueuedMessageType::GameGetReady),
        LobbyMessage::InvalidHash(name) => (format!("IHSH {name}"), QueuedMessageType::GameNotification),
        LobbyMessage::Ready(ready) => (
            format!("READY {}", u8::from(*ready)),
            QueuedMessageType::GamePlayersReadyStatus,
        ),
        LobbyMessage::FileHash(hash) => (format!("FHSH {hash}"), QueuedMessageType::GameNotification),
        LobbyMessage::InvalidSaveIndex => ("ISGI".to_string(), QueuedMessageType::GameNotification),
        LobbyMessage::TunnelPing(ms) => (format!("TNLPNG {ms}"), QueuedMessageType::GameNotification),
        LobbyMessage::ReadyToggle => return None,
    };
    Some(encoded)
}

fn is_host_broadcast(message: &LobbyMessage) -> bool {
    matches!(
        message,
        LobbyMessage::Options(_)
            | LobbyMessage::Start(_)
            | LobbyMessage::GetReady
            | LobbyMessage::NotAllPresent
            | LobbyMessage::InvalidHash(_)
    )
}

pub struct CncnetTransport {
    irc: IrcConnection,
    events: mpsc::UnboundedReceiver<IrcEvent>,
    settings: CncnetSettings,
    table: CommandTable<Vec<Inbound>>,
    tunnel: Option<TunnelServer>,
    addresses: HashMap<String, String>,
    pending: HashMap<JoinTicket, String>,
    admitted: HashSet<String>,
    next_ticket: u64,
    startup: Vec<TransportEvent>,
    reconnecting: bool,
    latency: Option<Arc<dyn LatencyProbe>>,
    ping_generation: u64,
    pings_tx: mpsc::UnboundedSender<(u64, Duration)>,
    pings: mpsc::UnboundedReceiver<(u64, Duration)>,
    left: bool,
}

impl CncnetTransport {
    /// Wrap a connection that has joined (or is joining) `settings.channel`.
    pub fn new(
        irc: IrcConnection,
        events: mpsc::UnboundedReceiver<IrcEvent>,
        settings: CncnetSettings,
    ) -> Self {
        let mut startup = Vec::new();
        let tunnel = match settings.tunnel.clone() {
            Some(t) if !Self::tunnel_known(&settings.known_tunnels, &t) => {
                startup.push(Self::blocked(&t.to_string()));
                None
            }
            other => other,
        };
        irc.request_who(&settings.channel);
        let (pings_tx, pings) = mpsc::unbounded_channel();

        Self {
            irc,
            events,
            table: ctcp_table(),
            tunnel,
            settings,
            addresses: HashMap::new(),
            pending: HashMap::new(),
            admitted: HashSet::new(),
            next_ticket: 1,
            startup,
            reconnecting: false,
            latency: None,
            ping_generation: 0,
            pings_tx,
            pings,
            left: false,
        }
    }

    /// Measure the round trip to the tunnel with `latency` now and after
    /// every tunnel change. Must run inside a tokio runtime.
    pub fn with_tunnel_latency(mut self, latency: Arc<dyn LatencyProbe>) -> Self {
        self.latency = Some(latency);
        self.measure_tunnel();
        self
    }

    pub fn tunnel(&self) -> Option<&TunnelServer> {
        self.tunnel.as_ref()
    }

    pub fn channel(&self) -> &str {
        &self.settings.channel
    }

    /// Start measuring the current tunnel. Results of older measurements
    /// are discarded.
    fn measure_tunnel(&mut self) {
        self.ping_generation += 1;
        let (Some(latency), Some(tunnel)) = (self.latency.clone(), self.tunnel.clone()) else {
            return;
        };
        let generation = self.ping_generation;
        let tx = self.pings_tx.clone();
        tokio::spawn(async move {
            let addr = match tokio::net::lookup_host((tunnel.address.as_str(), tunnel.port)).await {
                Ok(mut addrs) => addrs.next(),
                Err(e) => {
                    tracing::debug!("Cannot resolve tunnel {tunnel}: {e}");
                    None
                }
            };
            let Some(addr) = addr else {
                return;
            };
            match latency.probe(addr, TUNNEL_PING_TIMEOUT).await {
                Some(rtt) => {
                    tracing::debug!("Tunnel {tunnel} answered in {rtt:?}");
                    let _ = tx.send((generation, rtt));
                }
                None => tracing::info!("Tunnel {tunnel} did not answer"),
            }
        });
    }

    fn tunnel_known(known: &[TunnelServer], tunnel: &TunnelServer) -> bool {
        known.is_empty() || known.contains(tunnel)
    }

    fn blocked(tunnel: &str) -> TransportEvent {
        TransportEvent::LoadBlocked {
            reason: format!("The tunnel {tunnel} is not available. Loading is disabled until the host picks a valid tunnel."),
        }
    }

    fn is_ours(&self, channel: &str) -> bool {
        channel.eq_ignore_ascii_case(&self.settings.channel)
    }

    fn own_nick(&self) -> String {
        self.irc.nick()
    }

    fn send(&self, target: &str, message: &LobbyMessage) {
        match encode(message) {
            Some((payload, message_type)) => {
                self.irc.send_ctcp(target, &payload, message_type, LOBBY_PRIORITY);
            }
            None => tracing::trace!("No CTCP form for {message:?}"),
        }
    }

    fn request_join(&mut self, nick: String, out: &mut Vec<TransportEvent>) {
        if !self.settings.is_host
            || nick == self.own_nick()
            || self.admitted.contains(&nick)
            || self.pending.values().any(|n| *n == nick)
        {
            return;
        }
        let ticket = JoinTicket(self.next_ticket);
        self.next_ticket += 1;
        self.pending.insert(ticket, nick.clone());
        out.push(TransportEvent::JoinRequest {
            ticket,
            name: nick,
            game_id: None,
        });
    }

    fn departed(&mut self, nick: &str, out: &mut Vec<TransportEvent>) {
        if nick == self.own_nick() {
            out.push(TransportEvent::SessionEnded {
                reason: "You were removed from the game.".to_string(),
            });
        } else if !self.settings.is_host && nick == self.settings.host_nick {
            out.push(TransportEvent::SessionEnded {
                reason: "The host has left the game.".to_string(),
            });
        } else {
            self.pending.retain(|_, n| *n != nick);
            self.admitted.remove(nick);
            out.push(TransportEvent::PeerLeft { name: nick.to_string() });
        }
    }

    fn change_tunnel_from_host(&mut self, text: &str, out: &mut Vec<TransportEvent>) {
        match TunnelServer::parse(text).filter(|t| Self::tunnel_known(&self.settings.known_tunnels, t)) {
            Some(tunnel) => {
                out.push(TransportEvent::Notice(format!("The host changed the tunnel to {tunnel}.")));
                self.tunnel = Some(tunnel);
                self.measure_tunnel();
                out.push(TransportEvent::LoadUnblocked);
            }
            None => {
                tracing::warn!("Host selected unknown tunnel {text:?}");
                self.tunnel = None;
                out.push(Self::blocked(text));
            }
        }
    }

    fn handle_ctcp(&mut self, sender: String, payload: &str, out: &mut Vec<TransportEvent>) {
        let mut inbound = Vec::new();
        if !self.table.dispatch(&mut inbound, &sender, payload) {
            return;
        }
        let from_host = sender == self.settings.host_nick;
        for item in inbound {
            match item {
                Inbound::ChangeTunnel(text) => {
                    if !self.settings.is_host && from_host {
                        self.change_tunnel_from_host(&text, out);
                    }
                }
                Inbound::Lobby(message) => {
                    let allowed = match (self.settings.is_host, is_host_broadcast(&message)) {
                        (true, true) => false,
                        (false, true) => from_host,
                        (false, false) => matches!(message, LobbyMessage::TunnelPing(_)),
                        (true, false) => true,
                    };
                    if allowed {
                        out.push(TransportEvent::Message {
                            sender: sender.clone(),
                            message,
                        });
                    } else {
                        tracing::debug!("Ignoring {message:?} from {sender}");
                    }
                }
            }
        }
    }

    fn translate(&mut self, event: IrcEvent, out: &mut Vec<TransportEvent>) {
        match event {
            IrcEvent::Ctcp { sender, target, payload } => {
                if self.is_ours(&target) || target.eq_ignore_ascii_case(&self.own_nick()) {
                    self.handle_ctcp(sender, &payload, out);
                }
            }
            IrcEvent::ChatMessage {
                channel,
                nick,
                message,
                ..
            } if self.is_ours(&channel) => out.push(TransportEvent::Chat {
                sender: nick,
                color: None,
                text: message,
            }),
            IrcEvent::UserJoinedChannel {
                channel, nick, host, ..
            } if self.is_ours(&channel) => {
                if nick == self.own_nick() {
                    self.irc.request_who(&self.settings.channel);
                    return;
                }
                self.addresses.insert(nick.clone(), host.clone());
                out.push(TransportEvent::AddressResolved {
                    name: nick.clone(),
                    address: host,
                });
                self.request_join(nick, out);
            }
            IrcEvent::UserList { channel, users } if self.is_ours(&channel) => {
                for nick in users {
                    self.request_join(nick, out);
                }
            }
            IrcEvent::WhoReply { nick, host, .. } => {
                self.addresses.insert(nick.clone(), host.clone());
                out.push(TransportEvent::AddressResolved {
                    name: nick,
                    address: host,
                });
            }
            IrcEvent::UserLeftChannel { channel, nick } | IrcEvent::UserKicked { channel, nick }
                if self.is_ours(&channel) =>
            {
                self.departed(&nick, out);
            }
            IrcEvent::UserQuit { nick, .. } => {
                if self.admitted.contains(&nick)
                    || self.pending.values().any(|n| *n == nick)
                    || nick == self.settings.host_nick
                {
                    self.departed(&nick, out);
                }
            }
            IrcEvent::NickChanged { old, new } => {
                if old == self.settings.host_nick {
                    self.settings.host_nick = new;
                } else if self.admitted.contains(&old) {
                    self.departed(&old, out);
                }
            }
            IrcEvent::ConnectionLost { reason } => {
                self.reconnecting = true;
                out.push(TransportEvent::Notice(format!(
                    "Connection to the server was lost ({reason}). Reconnecting..."
                )));
            }
            IrcEvent::ReconnectAttempt { attempt } if self.reconnecting => {
                out.push(TransportEvent::Notice(format!("Reconnect attempt {attempt}.")));
            }
            IrcEvent::Welcome { .. } if self.reconnecting => {
                self.reconnecting = false;
                if !self.left {
                    tracing::info!("Reconnected; rejoining {}", self.settings.channel);
                    self.irc
                        .join_channel(&self.settings.channel, self.settings.password.as_deref());
                    out.push(TransportEvent::Notice("Reconnected to the server.".to_string()));
                }
            }
            IrcEvent::ReconnectBudgetExhausted => out.push(TransportEvent::SessionEnded {
                reason: "Connection to the server was lost.".to_string(),
            }),
            IrcEvent::Disconnected => out.push(TransportEvent::SessionEnded {
                reason: "Disconnected from the server.".to_string(),
            }),
            IrcEvent::CannotSendToChannel { channel } if self.is_ours(&channel) => {
                out.push(TransportEvent::Notice("Cannot send messages to the game channel.".to_string()));
            }
            _ => {}
        }
    }
}

impl LoadingTransport for CncnetTransport {
    fn is_host(&self) -> bool {
        self.settings.is_host
    }

    fn broadcast(&mut self, message: &LobbyMessage) {
        self.send(&self.settings.channel, message);
    }

    fn send_to_host(&mut self, message: &LobbyMessage) {
        self.send(&self.settings.host_nick, message);
    }

    fn send_chat(&mut self, _color: i32, text: &str) {
        self.irc.send_chat(&self.settings.channel, text, 0);
    }

    fn accept_join(&mut self, ticket: JoinTicket) -> Option<String> {
        let nick = self.pending.remove(&ticket)?;
        let address = self.addresses.get(&nick).cloned();
        self.admitted.insert(nick);
        address
    }

    fn reject_join(&mut self, ticket: JoinTicket) {
        if let Some(nick) = self.pending.remove(&ticket) {
            tracing::info!("Kicking {nick} from {}", self.settings.channel);
            self.irc.kick_user(&self.settings.channel, &nick);
        }
    }

    fn remove_player(&mut self, name: &str) {
        if self.admitted.remove(name) {
            self.irc.kick_user(&self.settings.channel, name);
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut out = std::mem::take(&mut self.startup);
        while let Ok(event) = self.events.try_recv() {
            self.translate(event, &mut out);
        }
        while let Ok((generation, rtt)) = self.pings.try_recv() {
            if generation == self.ping_generation {
                let ms = i32::try_from(rtt.as_millis()).unwrap_or(i32::MAX);
                out.push(TransportEvent::TunnelPingMeasured(ms));
            }
        }
        out
    }

    fn assign_endpoints(&mut self, players: &mut [PlayerInfo]) {
        let mut rng = rand::rng();
        let mut used = HashSet::new();
        for player in players.iter_mut() {
            let mut port = rng.random_range(GAME_PORT_RANGE);
            while !used.insert(port) {
                port = rng.random_range(GAME_PORT_RANGE);
            }
            player.port = port;
            if let Some(address) = self.addresses.get(&player.name) {
                player.ip_address = address.clone();
            }
        }
    }

    fn spawn_additions(&self, spawn: &mut IniDocument) {
        if let Some(tunnel) = &self.tunnel {
            spawn.set("Tunnel", "Ip", &tunnel.address);
            spawn.set("Tunnel", "Port", tunnel.port);
        }
    }

    fn change_tunnel(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.settings.is_host {
            return Err(TransportError::NotHost);
        }
        let tunnel = TunnelServer::parse(text)
            .filter(|t| Self::tunnel_known(&self.settings.known_tunnels, t))
            .ok_or_else(|| TransportError::InvalidTunnel(text.to_string()))?;
        self.irc.send_ctcp(
            &self.settings.channel,
            &format!("CHTNL {tunnel}"),
            QueuedMessageType::GameNotification,
            LOBBY_PRIORITY,
        );
        self.tunnel = Some(tunnel);
        self.measure_tunnel();
        Ok(())
    }

    fn leave(&mut self) {
        if !self.left {
            self.left = true;
            self.irc.leave_channel(&self.settings.channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cncnet_irc::{ConnectionSettings, TcpConnectProbe};

    use crate::options::{LobbyOptions, OptionsPlayer};

    const CHANNEL: &str = "#cncnet-game-5521";

    fn transport(local: &str, is_host: bool, known: Vec<TunnelServer>) -> (CncnetTransport, mpsc::UnboundedSender<IrcEvent>) {
        let settings = ConnectionSettings {
            nick: local.to_string(),
            ..Default::default()
        };
        let (irc, _irc_events) = IrcConnection::new(settings, Vec::new(), Arc::new(TcpConnectProbe));
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = CncnetTransport::new(
            irc,
            rx,
            CncnetSettings {
                channel: CHANNEL.to_string(),
                host_nick: "Alice".to_string(),
                is_host,
                tunnel: Some(TunnelServer::new("5.9.1.2", 50000)),
                known_tunnels: known,
                password: Some("secret".to_string()),
            },
        );
        (transport, tx)
    }

    fn joined(nick: &str, host: &str) -> IrcEvent {
        IrcEvent::UserJoinedChannel {
            channel: CHANNEL.to_string(),
            nick: nick.to_string(),
            ident: "ident".to_string(),
            host: host.to_string(),
        }
    }

    fn ctcp(sender: &str, payload: &str) -> IrcEvent {
        IrcEvent::Ctcp {
            sender: sender.to_string(),
            target: CHANNEL.to_string(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_ctcp_encodings() {
        let options = LobbyMessage::Options(LobbyOptions {
            save_index: 2,
            players: vec![
                OptionsPlayer {
                    name: "Alice".into(),
                    ready: true,
                    address: None,
                },
                OptionsPlayer {
                    name: "Bob".into(),
                    ready: false,
                    address: Some("10.0.0.2".into()),
                },
            ],
        });
        assert_eq!(
            encode(&options),
            Some(("OP 2;Alice:1;Bob:0".to_string(), QueuedMessageType::GamePlayers))
        );
        assert_eq!(encode(&LobbyMessage::Ready(true)).unwrap().0, "READY 1");
        assert_eq!(encode(&LobbyMessage::GetReady).unwrap().0, "GTRDY");
        assert_eq!(encode(&LobbyMessage::ReadyToggle), None);
    }

    #[test]
    fn test_host_turns_channel_joins_into_requests() {
        let (mut t, tx) = transport("Alice", true, Vec::new());
        tx.send(joined("Bob", "10.0.0.2")).unwrap();
        tx.send(joined("Mallory", "10.0.0.9")).unwrap();
        let events = t.poll_events();

        let tickets: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::JoinRequest { ticket, name, game_id } => {
                    assert!(game_id.is_none());
                    Some((*ticket, name.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(tickets.len(), 2);

        assert_eq!(t.accept_join(tickets[0].0), Some("10.0.0.2".to_string()));
        t.reject_join(tickets[1].0);
        assert!(t.pending.is_empty());

        tx.send(IrcEvent::UserList {
            channel: CHANNEL.to_string(),
            users: vec!["Alice".into(), "Bob".into(), "Carol".into()],
        })
        .unwrap();
        let requests: Vec<_> = t
            .poll_events()
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::JoinRequest { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(requests, vec!["Carol".to_string()]);
    }

    #[test]
    fn test_client_only_trusts_host_broadcasts() {
        let (mut t, tx) = transport("Bob", false, Vec::new());
        tx.send(ctcp("Mallory", "OP 0;Mallory:1")).unwrap();
        tx.send(ctcp("Alice", "OP 0;Alice:1;Bob:0")).unwrap();
        tx.send(ctcp("Alice", "OP garbage")).unwrap();
        tx.send(ctcp("Carol", "READY 1")).unwrap();
        let events = t.poll_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            TransportEvent::Message { sender, message: LobbyMessage::Options(o) }
                if sender == "Alice" && o.players.len() == 2
        ));
    }

    #[test]
    fn test_host_ignores_broadcast_keywords() {
        let (mut t, tx) = transport("Alice", true, Vec::new());
        tx.send(ctcp("Bob", "START Bob;1.2.3.4:1000")).unwrap();
        tx.send(ctcp("Bob", "READY 1")).unwrap();
        tx.send(ctcp("Bob", "FHSH abc")).unwrap();
        let messages: Vec<_> = t
            .poll_events()
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::Message { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(
            messages,
            vec![LobbyMessage::Ready(true), LobbyMessage::FileHash("abc".into())]
        );
    }

    #[test]
    fn test_host_departure_ends_session() {
        let (mut t, tx) = transport("Bob", false, Vec::new());
        tx.send(IrcEvent::UserLeftChannel {
            channel: CHANNEL.to_string(),
            nick: "Carol".into(),
        })
        .unwrap();
        tx.send(IrcEvent::UserQuit {
            nick: "Alice".into(),
            reason: "bye".into(),
        })
        .unwrap();
        let events = t.poll_events();
        assert_eq!(events[0], TransportEvent::PeerLeft { name: "Carol".into() });
        assert!(matches!(&events[1], TransportEvent::SessionEnded { reason } if reason.contains("host")));
    }

    #[test]
    fn test_unknown_tunnel_blocks_loading() {
        let known = vec![TunnelServer::new("5.9.1.2", 50000), TunnelServer::new("8.8.4.4", 50001)];
        let (mut t, tx) = transport("Bob", false, known);
        assert!(t.poll_events().is_empty());

        tx.send(ctcp("Alice", "CHTNL 6.6.6.6:1")).unwrap();
        let events = t.poll_events();
        assert!(matches!(events[0], TransportEvent::LoadBlocked { .. }));
        assert!(t.tunnel().is_none());

        tx.send(ctcp("Alice", "CHTNL 8.8.4.4:50001")).unwrap();
        let events = t.poll_events();
        assert!(events.contains(&TransportEvent::LoadUnblocked));
        assert_eq!(t.tunnel(), Some(&TunnelServer::new("8.8.4.4", 50001)));
    }

    #[test]
    fn test_initial_invalid_tunnel_is_reported_once() {
        let (mut t, _tx) = transport("Alice", true, vec![TunnelServer::new("8.8.4.4", 50001)]);
        assert!(matches!(t.poll_events()[..], [TransportEvent::LoadBlocked { .. }]));
        assert!(t.poll_events().is_empty());

        assert_eq!(
            t.change_tunnel("6.6.6.6:1"),
            Err(TransportError::InvalidTunnel("6.6.6.6:1".into()))
        );
        t.change_tunnel("8.8.4.4:50001").unwrap();

        let mut spawn = IniDocument::new();
        t.spawn_additions(&mut spawn);
        assert_eq!(spawn.get("Tunnel", "Ip"), Some("8.8.4.4"));
        assert_eq!(spawn.get("Tunnel", "Port"), Some("50001"));
    }

    #[test]
    fn test_assign_endpoints_uses_who_addresses_and_distinct_ports() {
        let (mut t, tx) = transport("Alice", true, Vec::new());
        tx.send(IrcEvent::WhoReply {
            channel: CHANNEL.to_string(),
            ident: "a".into(),
            host: "10.0.0.1".into(),
            nick: "Alice".into(),
            extra: "0 Alice".into(),
        })
        .unwrap();
        tx.send(joined("Bob", "10.0.0.2")).unwrap();
        t.poll_events();

        let mut players = vec![PlayerInfo::new("Alice"), PlayerInfo::new("Bob")];
        t.assign_endpoints(&mut players);
        assert_eq!(players[0].ip_address, "10.0.0.1");
        assert_eq!(players[1].ip_address, "10.0.0.2");
        assert_ne!(players[0].port, players[1].port);
        assert!(players.iter().all(|p| GAME_PORT_RANGE.contains(&p.port)));
    }

    #[test]
    fn test_lost_connection_waits_for_reconnect() {
        let (mut t, tx) = transport("Bob", false, Vec::new());
        tx.send(IrcEvent::ConnectionLost {
            reason: "reset by peer".into(),
        })
        .unwrap();
        tx.send(IrcEvent::ReconnectAttempt { attempt: 1 }).unwrap();
        let events = t.poll_events();
        assert!(!events.iter().any(|e| matches!(e, TransportEvent::SessionEnded { .. })));
        assert!(matches!(&events[0], TransportEvent::Notice(text) if text.contains("reset by peer")));
        assert!(t.reconnecting);

        tx.send(IrcEvent::Welcome {
            message: "Welcome back".into(),
        })
        .unwrap();
        let events = t.poll_events();
        assert_eq!(
            events,
            vec![TransportEvent::Notice("Reconnected to the server.".to_string())]
        );
        assert!(!t.reconnecting);

        tx.send(IrcEvent::ConnectionLost { reason: "timeout".into() }).unwrap();
        tx.send(IrcEvent::ReconnectBudgetExhausted).unwrap();
        let events = t.poll_events();
        assert!(matches!(events.last(), Some(TransportEvent::SessionEnded { .. })));
    }

    #[test]
    fn test_welcome_without_lost_connection_is_ignored() {
        let (mut t, tx) = transport("Bob", false, Vec::new());
        tx.send(IrcEvent::Welcome { message: "hi".into() }).unwrap();
        assert!(t.poll_events().is_empty());
    }

    struct FixedLatency(Duration);

    impl LatencyProbe for FixedLatency {
        fn probe(
            &self,
            _addr: std::net::SocketAddr,
            _timeout: Duration,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<Duration>> + Send + '_>> {
            let rtt = self.0;
            Box::pin(async move { Some(rtt) })
        }
    }

    #[tokio::test]
    async fn test_tunnel_round_trip_reported_for_current_tunnel_only() {
        let (t, _tx) = transport("Alice", true, Vec::new());
        let mut t = t.with_tunnel_latency(Arc::new(FixedLatency(Duration::from_millis(7))));
        t.change_tunnel("127.0.0.1:50001").unwrap();

        let mut measured = Vec::new();
        for _ in 0..50 {
            for event in t.poll_events() {
                if let TransportEvent::TunnelPingMeasured(ms) = event {
                    measured.push(ms);
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(measured, vec![7]);
    }

    #[test]
    fn test_tunnel_parse() {
        assert_eq!(TunnelServer::parse("1.2.3.4:50000"), Some(TunnelServer::new("1.2.3.4", 50000)));
        assert_eq!(TunnelServer::parse("1.2.3.4"), None);
        assert_eq!(TunnelServer::parse(":1"), None);
        assert_eq!(TunnelServer::new("1.2.3.4", 5).to_string(), "1.2.3.4:5");
    }
}

//! Loading-lobby transports over the LAN protocol.
//!
//! The host side wraps a [`LanHost`]: pending sockets become join requests,
//! client chat is relayed to the other clients, and the lobby is advertised over UDP.
//! The client side wraps a [`LanClient`]. LAN frames carry no endpoints in
//! `GAME_START`; every player listens on the configured in-game port at the
//! address the host reported in the last `OPTIONS`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use cncnet_lan::{
    Advertisement, ClientCommand, ClientEvent, ConnectionId, HostCommand, HostEvent, LanClient,
    LanCodec, LanHost, LanOptions, LanOptionsPlayer, advertise_loop,
};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::options::{LobbyOptions, OptionsPlayer, StartEntry};
use crate::player::PlayerInfo;
use crate::transport::{JoinTicket, LoadingTransport, LobbyMessage, TransportEvent};

/// What the host advertises to LAN browsers.
#[derive(Debug, Clone)]
pub struct AdvertiseSettings {
    /// Broadcast address and discovery port.
    pub target: SocketAddr,
    pub interval: Duration,
    pub revision: String,
    pub version: String,
    pub game_id: String,
    pub map: String,
    pub mode: String,
    /// Roster size; the lobby is full at this many players.
    pub max_players: usize,
}

struct Advertiser {
    template: Advertisement,
    max_players: usize,
    advert_tx: watch::Sender<Option<Advertisement>>,
    shutdown_tx: watch::Sender<bool>,
}

struct PendingJoin {
    conn: ConnectionId,
    name: String,
    addr: SocketAddr,
}

pub struct LanHostTransport {
    host: LanHost,
    events: mpsc::UnboundedReceiver<HostEvent>,
    codec: LanCodec,
    own_name: String,
    ingame_port: u16,
    names: HashMap<ConnectionId, String>,
    pending: HashMap<JoinTicket, PendingJoin>,
    advertiser: Option<Advertiser>,
    left: bool,
}

impl LanHostTransport {
    pub fn new(
        host: LanHost,
        events: mpsc::UnboundedReceiver<HostEvent>,
        own_name: impl Into<String>,
        ingame_port: u16,
    ) -> Self {
        Self {
            codec: host.codec(),
            host,
            events,
            own_name: own_name.into(),
            ingame_port,
            names: HashMap::new(),
            pending: HashMap::new(),
            advertiser: None,
            left: false,
        }
    }

    /// Start advertising the lobby on `socket`. Must run inside a tokio
    /// runtime.
    pub fn with_advertisement(mut self, socket: UdpSocket, settings: AdvertiseSettings) -> Self {
        let template = Advertisement {
            revision: settings.revision,
            version: settings.version,
            game_id: settings.game_id,
            map: settings.map,
            mode: settings.mode,
            players: Vec::new(),
            started: false,
            full: false,
        };
        let (advert_tx, advert_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(advertise_loop(
            socket,
            settings.target,
            self.codec,
            settings.interval,
            advert_rx,
            shutdown_rx,
        ));
        self.advertiser = Some(Advertiser {
            template,
            max_players: settings.max_players,
            advert_tx,
            shutdown_tx,
        });
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.host.local_addr()
    }

    /// The advertisement currently published, if advertising.
    pub fn advertisement(&self) -> Option<Advertisement> {
        self.advertiser.as_ref().and_then(|a| a.advert_tx.borrow().clone())
    }

    fn handle_command(&mut self, conn: ConnectionId, command: HostCommand, out: &mut Vec<TransportEvent>) {
        let Some(name) = self.names.get(&conn).cloned() else {
            tracing::debug!("Command from unknown connection {conn:?}");
            return;
        };
        match command {
            HostCommand::Chat { color, text } => {
                // The sender already shows its own line.
                self.host
                    .broadcast_except(conn, &self.codec.relayed_chat(&name, color, &text));
                out.push(TransportEvent::Chat {
                    sender: name,
                    color: Some(color),
                    text,
                });
            }
            HostCommand::ReadyStatus => out.push(TransportEvent::Message {
                sender: name,
                message: LobbyMessage::ReadyToggle,
            }),
            HostCommand::FileHash(hash) => out.push(TransportEvent::Message {
                sender: name,
                message: LobbyMessage::FileHash(hash),
            }),
            HostCommand::Quit | HostCommand::Ping => {}
        }
    }
}

impl LoadingTransport for LanHostTransport {
    fn is_host(&self) -> bool {
        true
    }

    fn broadcast(&mut self, message: &LobbyMessage) {
        match message {
            LobbyMessage::Options(options) => {
                let options = LanOptions {
                    save_index: options.save_index,
                    players: options
                        .players
                        .iter()
                        .map(|p| LanOptionsPlayer {
                            name: p.name.clone(),
                            ready: p.ready,
                            address: p.address.clone().unwrap_or_default(),
                        })
                        .collect(),
                };
                self.host.broadcast(&self.codec.options(&options));
            }
            LobbyMessage::Start(_) => self.host.broadcast(&self.codec.game_start()),
            other => tracing::trace!("No LAN frame for {other:?}"),
        }
    }

    fn send_to_host(&mut self, message: &LobbyMessage) {
        tracing::trace!("Host does not send {message:?} to itself");
    }

    fn send_chat(&mut self, color: i32, text: &str) {
        self.host.broadcast(&self.codec.relayed_chat(&self.own_name, color, text));
    }

    fn accept_join(&mut self, ticket: JoinTicket) -> Option<String> {
        let join = self.pending.remove(&ticket)?;
        if !self.host.accept(join.conn) {
            return None;
        }
        self.names.insert(join.conn, join.name);
        Some(join.addr.ip().to_string())
    }

    fn reject_join(&mut self, ticket: JoinTicket) {
        if let Some(join) = self.pending.remove(&ticket) {
            self.host.reject(join.conn);
        }
    }

    fn remove_player(&mut self, name: &str) {
        let conn = self.names.iter().find(|(_, n)| *n == name).map(|(c, _)| *c);
        if let Some(conn) = conn {
            self.names.remove(&conn);
            self.host.disconnect(conn);
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                HostEvent::JoinRequested {
                    conn,
                    name,
                    game_id,
                    addr,
                } => {
                    let ticket = JoinTicket(conn.0);
                    self.pending.insert(
                        ticket,
                        PendingJoin {
                            conn,
                            name: name.clone(),
                            addr,
                        },
                    );
                    out.push(TransportEvent::JoinRequest {
                        ticket,
                        name,
                        game_id: Some(game_id),
                    });
                }
                HostEvent::Command { conn, command } => self.handle_command(conn, command, &mut out),
                HostEvent::PeerDisconnected { conn, reason } => {
                    if let Some(name) = self.names.remove(&conn) {
                        tracing::debug!("{name} disconnected: {reason:?}");
                        out.push(TransportEvent::PeerLeft { name });
                    }
                }
                HostEvent::PeerTimedOut { conn } => {
                    if let Some(name) = self.names.remove(&conn) {
                        out.push(TransportEvent::Notice(format!("{name} timed out.")));
                        out.push(TransportEvent::PeerLeft { name });
                    }
                }
            }
        }
        out
    }

    fn assign_endpoints(&mut self, players: &mut [PlayerInfo]) {
        for player in players {
            player.port = self.ingame_port;
        }
    }

    fn publish_roster(&mut self, players: &[PlayerInfo], started: bool) {
        if let Some(advertiser) = &self.advertiser {
            let mut advert = advertiser.template.clone();
            advert.players = players.iter().map(|p| p.name.clone()).collect();
            advert.started = started;
            advert.full = players.len() >= advertiser.max_players;
            advertiser.advert_tx.send_replace(Some(advert));
        }
    }

    fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        self.host.shutdown();
        if let Some(advertiser) = &self.advertiser {
            let _ = advertiser.shutdown_tx.send(true);
        }
    }
}

pub struct LanClientTransport {
    client: LanClient,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    codec: LanCodec,
    ingame_port: u16,
    host_ip: IpAddr,
    last_options: Option<LanOptions>,
}

impl LanClientTransport {
    pub fn new(client: LanClient, events: mpsc::UnboundedReceiver<ClientEvent>, ingame_port: u16) -> Self {
        Self {
            codec: client.codec(),
            host_ip: client.host_addr().ip(),
            client,
            events,
            ingame_port,
            last_options: None,
        }
    }

    /// Players with no usable address are reached through the host's address.
    fn resolve(&self, address: &str) -> String {
        match address.parse::<IpAddr>() {
            Ok(ip) if !ip.is_unspecified() => address.to_string(),
            _ => self.host_ip.to_string(),
        }
    }

    fn host_label(&self) -> String {
        self.host_ip.to_string()
    }

    fn start_entries(&self) -> Vec<StartEntry> {
        self.last_options
            .iter()
            .flat_map(|o| &o.players)
            .map(|p| StartEntry {
                name: p.name.clone(),
                ip: self.resolve(&p.address),
                port: self.ingame_port,
            })
            .collect()
    }
}

impl LoadingTransport for LanClientTransport {
    fn is_host(&self) -> bool {
        false
    }

    fn broadcast(&mut self, message: &LobbyMessage) {
        tracing::trace!("Client cannot broadcast {message:?}");
    }

    fn send_to_host(&mut self, message: &LobbyMessage) {
        match message {
            LobbyMessage::Ready(_) | LobbyMessage::ReadyToggle => self.client.send(self.codec.ready_status()),
            LobbyMessage::FileHash(hash) => self.client.send(self.codec.file_hash(hash)),
            other => tracing::trace!("No LAN frame for {other:?}"),
        }
    }

    fn send_chat(&mut self, color: i32, text: &str) {
        self.client.send(self.codec.client_chat(color, text));
    }

    fn accept_join(&mut self, _ticket: JoinTicket) -> Option<String> {
        None
    }

    fn reject_join(&mut self, _ticket: JoinTicket) {}

    fn remove_player(&mut self, _name: &str) {}

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                ClientEvent::Command(ClientCommand::Options(options)) => {
                    let message = LobbyMessage::Options(LobbyOptions {
                        save_index: options.save_index,
                        players: options
                            .players
                            .iter()
                            .map(|p| OptionsPlayer {
                                name: p.name.clone(),
                                ready: p.ready,
                                address: Some(self.resolve(&p.address)),
                            })
                            .collect(),
                    });
                    self.last_options = Some(options);
                    out.push(TransportEvent::Message {
                        sender: self.host_label(),
                        message,
                    });
                }
                ClientEvent::Command(ClientCommand::GameStart) => out.push(TransportEvent::Message {
                    sender: self.host_label(),
                    message: LobbyMessage::Start(self.start_entries()),
                }),
                ClientEvent::Command(ClientCommand::Chat { sender, color, text }) => {
                    out.push(TransportEvent::Chat {
                        sender,
                        color: Some(color),
                        text,
                    });
                }
                ClientEvent::Command(ClientCommand::Ping) => {}
                ClientEvent::Disconnected => out.push(TransportEvent::SessionEnded {
                    reason: "The host closed the connection.".to_string(),
                }),
                ClientEvent::HostTimedOut => out.push(TransportEvent::SessionEnded {
                    reason: "The connection to the host timed out.".to_string(),
                }),
            }
        }
        out
    }

    fn assign_endpoints(&mut self, _players: &mut [PlayerInfo]) {}

    fn leave(&mut self) {
        if !self.client.is_closed() {
            self.client.leave();
        }
    }
}

//! LAN lobby host.
//!
//! The host binds the lobby listener and runs one accept loop. Each new
//! socket must open with a `PLAYER_JOIN` frame; the request is posted as
//! [`HostEvent::JoinRequested`] and the connection waits until the owner
//! calls [`LanHost::accept`] or [`LanHost::reject`]. Rejection closes the
//! socket without writing a byte.
//!
//! Accepted peers get a reader task, a writer task fed by an unbounded
//! channel, and are watched by a shared liveness task that drops silent
//! peers and pings idle ones.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use cncnet_protocol::{FrameError, FrameReader};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::error::LanError;
use crate::frames::{HostCommand, HostFrameDecoder, LanCodec, parse_join};
use crate::liveness::{Activity, Liveness};
use crate::platform::{SocketConfig, configure_stream, create_listener};

/// Identifier of one accepted socket for the lifetime of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Monotonic [`ConnectionId`] source.
#[derive(Debug)]
struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Host configuration.
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Lobby listener address.
    pub bind_addr: SocketAddr,
    /// Field separator.
    pub data_separator: u8,
    /// Frame terminator.
    pub message_separator: u8,
    /// Silence after which a peer is dropped. Default: 20 s.
    pub dropout_timeout: Duration,
    /// Send a `PING` when nothing was sent for this long. Default: 5 s.
    pub keepalive_interval: Duration,
    /// Time a new socket has to send its join frame. Default: 10 s.
    pub handshake_timeout: Duration,
    /// Period of the liveness task. Default: 1 s.
    pub liveness_period: Duration,
    /// Socket options.
    pub socket: SocketConfig,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            bind_addr: crate::platform::lobby_bind_address(1233),
            data_separator: 0x01,
            message_separator: 0x02,
            dropout_timeout: Duration::from_secs(20),
            keepalive_interval: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            liveness_period: Duration::from_secs(1),
            socket: SocketConfig::default(),
        }
    }
}

/// Why a peer went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent `QUIT`.
    Quit,
    /// The peer closed its socket.
    Closed,
    /// Reading from the socket failed.
    ReadError(String),
}

/// Something that happened on the host's sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A new socket sent a well-formed join frame.
    JoinRequested {
        /// Pending connection; pass to `accept` or `reject`.
        conn: ConnectionId,
        /// Requested player name.
        name: String,
        /// Saved-game id the client has loaded.
        game_id: String,
        /// Remote address of the socket.
        addr: SocketAddr,
    },
    /// An accepted peer sent a command.
    Command {
        /// Sending peer.
        conn: ConnectionId,
        /// Decoded command.
        command: HostCommand,
    },
    /// An accepted peer left or its socket failed.
    PeerDisconnected {
        /// The peer.
        conn: ConnectionId,
        /// Cause.
        reason: DisconnectReason,
    },
    /// An accepted peer was silent beyond the dropout timeout and was closed.
    PeerTimedOut {
        /// The peer.
        conn: ConnectionId,
    },
}

struct PendingJoin {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    addr: SocketAddr,
    backlog: Vec<String>,
}

struct Peer {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    activity: Arc<Activity>,
    shutdown: watch::Sender<bool>,
}

struct Shared {
    settings: HostSettings,
    codec: LanCodec,
    ids: IdGenerator,
    peers: Mutex<HashMap<ConnectionId, Peer>>,
    pending: Mutex<HashMap<ConnectionId, PendingJoin>>,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl Shared {
    fn peers(&self) -> MutexGuard<'_, HashMap<ConnectionId, Peer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<ConnectionId, PendingJoin>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }

    /// Remove `conn` and post `PeerDisconnected` if it was still present.
    fn drop_peer(&self, conn: ConnectionId, reason: DisconnectReason) {
        let removed = self.peers().remove(&conn);
        if let Some(peer) = removed {
            let _ = peer.shutdown.send(true);
            tracing::info!("Connection {conn:?} ({}) closed: {reason:?}", peer.addr);
            self.emit(HostEvent::PeerDisconnected { conn, reason });
        }
    }
}

/// A running LAN lobby host.
pub struct LanHost {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl LanHost {
    /// Bind the listener and start the accept and liveness tasks.
    pub fn start(settings: HostSettings) -> Result<(Self, mpsc::UnboundedReceiver<HostEvent>), LanError> {
        let listener = create_listener(settings.bind_addr, &settings.socket).map_err(|source| LanError::Bind {
            addr: settings.bind_addr,
            source,
        })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("LAN lobby listening on {local_addr}");

        let (events, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            codec: LanCodec::new(settings.data_separator, settings.message_separator),
            settings,
            ids: IdGenerator::new(),
            peers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            events,
        });

        tokio::spawn(accept_loop(Arc::clone(&shared), listener, shutdown_rx.clone()));
        tokio::spawn(liveness_loop(Arc::clone(&shared), shutdown_rx));

        Ok((
            Self {
                shared,
                local_addr,
                shutdown_tx,
            },
            rx,
        ))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Frame encoder using this host's separators.
    pub fn codec(&self) -> LanCodec {
        self.shared.codec
    }

    /// Admit a pending join. Returns `false` if `conn` is not pending.
    pub fn accept(&self, conn: ConnectionId) -> bool {
        let Some(pending) = self.shared.pending().remove(&conn) else {
            return false;
        };

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let activity = Arc::new(Activity::new(Instant::now()));
        self.shared.peers().insert(
            conn,
            Peer {
                addr: pending.addr,
                outbound,
                activity: Arc::clone(&activity),
                shutdown,
            },
        );
        tracing::info!("Accepted connection {conn:?} from {}", pending.addr);

        tokio::spawn(write_loop(
            conn,
            pending.writer,
            outbound_rx,
            Arc::clone(&activity),
            shutdown_rx.clone(),
        ));
        tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            conn,
            pending.addr,
            pending.reader,
            pending.backlog,
            activity,
            shutdown_rx,
        ));
        true
    }

    /// Refuse a pending join by closing its socket without a reply.
    pub fn reject(&self, conn: ConnectionId) {
        if let Some(pending) = self.shared.pending().remove(&conn) {
            tracing::info!("Rejected join from {}", pending.addr);
        }
    }

    /// Queue `frame` to every accepted peer.
    pub fn broadcast(&self, frame: &[u8]) {
        for (conn, peer) in self.shared.peers().iter() {
            if peer.outbound.send(frame.to_vec()).is_err() {
                tracing::debug!("Broadcast to {conn:?} skipped: writer closed");
            }
        }
    }

    /// Queue `frame` to every accepted peer other than `origin`.
    pub fn broadcast_except(&self, origin: ConnectionId, frame: &[u8]) {
        for (conn, peer) in self.shared.peers().iter() {
            if *conn == origin {
                continue;
            }
            if peer.outbound.send(frame.to_vec()).is_err() {
                tracing::debug!("Broadcast to {conn:?} skipped: writer closed");
            }
        }
    }

    /// Queue `frame` to one peer. Returns `false` if it is not connected.
    pub fn send_to(&self, conn: ConnectionId, frame: &[u8]) -> bool {
        match self.shared.peers().get(&conn) {
            Some(peer) => peer.outbound.send(frame.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Close an accepted peer. No event is posted.
    pub fn disconnect(&self, conn: ConnectionId) {
        if let Some(peer) = self.shared.peers().remove(&conn) {
            let _ = peer.shutdown.send(true);
            tracing::info!("Closed connection {conn:?} ({})", peer.addr);
        }
    }

    /// Remote address of an accepted peer.
    pub fn peer_addr(&self, conn: ConnectionId) -> Option<SocketAddr> {
        self.shared.peers().get(&conn).map(|p| p.addr)
    }

    /// Number of accepted peers.
    pub fn peer_count(&self) -> usize {
        self.shared.peers().len()
    }

    /// Stop accepting and close every socket.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let peers: Vec<Peer> = self.shared.peers().drain().map(|(_, p)| p).collect();
        for peer in peers {
            let _ = peer.shutdown.send(true);
        }
        self.shared.pending().clear();
    }
}

impl Drop for LanHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    if let Err(e) = configure_stream(&stream, &shared.settings.socket) {
                        tracing::debug!("Socket options for {addr} failed: {e}");
                    }
                    tokio::spawn(handshake(Arc::clone(&shared), stream.into_split(), addr));
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = shutdown_rx.changed() => {
                tracing::info!("LAN lobby listener shutting down");
                break;
            }
        }
    }
}

async fn handshake(shared: Arc<Shared>, (read, writer): (OwnedReadHalf, OwnedWriteHalf), addr: SocketAddr) {
    let mut reader = FrameReader::new(read, shared.settings.message_separator);
    let first_read = tokio::time::timeout(shared.settings.handshake_timeout, async {
        loop {
            let frames = reader.read_frames().await?;
            if !frames.is_empty() {
                return Ok::<_, FrameError>(frames);
            }
        }
    })
    .await;

    let mut frames = match first_read {
        Ok(Ok(frames)) => frames,
        Ok(Err(e)) => {
            tracing::debug!("Handshake with {addr} failed: {e}");
            return;
        }
        Err(_) => {
            tracing::debug!("Handshake with {addr} timed out");
            return;
        }
    };

    let first = frames.remove(0);
    let Some((name, game_id)) = parse_join(&first, shared.settings.data_separator) else {
        tracing::debug!("Closing {addr}: expected join, got {first:?}");
        return;
    };

    let conn = shared.ids.next_id();
    shared.pending().insert(
        conn,
        PendingJoin {
            reader,
            writer,
            addr,
            backlog: frames,
        },
    );
    tracing::debug!("Join request {conn:?} from {addr} as {name:?}");
    shared.emit(HostEvent::JoinRequested {
        conn,
        name,
        game_id,
        addr,
    });
}

/// Handle one frame. Returns `false` once the peer has quit.
fn handle_frame(shared: &Shared, decoder: &HostFrameDecoder, conn: ConnectionId, sender: &str, frame: &str) -> bool {
    match decoder.decode(sender, frame) {
        Some(HostCommand::Quit) => {
            shared.drop_peer(conn, DisconnectReason::Quit);
            false
        }
        Some(HostCommand::Ping) | None => true,
        Some(command) => {
            shared.emit(HostEvent::Command { conn, command });
            true
        }
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    conn: ConnectionId,
    addr: SocketAddr,
    mut reader: FrameReader<OwnedReadHalf>,
    backlog: Vec<String>,
    activity: Arc<Activity>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let decoder = HostFrameDecoder::new(shared.settings.data_separator);
    let sender = addr.to_string();

    for frame in &backlog {
        if !handle_frame(&shared, &decoder, conn, &sender, frame) {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            result = reader.read_frames() => match result {
                Ok(frames) => {
                    activity.mark_received(Instant::now());
                    for frame in &frames {
                        if !handle_frame(&shared, &decoder, conn, &sender, frame) {
                            return;
                        }
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    shared.drop_peer(conn, DisconnectReason::Closed);
                    return;
                }
                Err(e) => {
                    shared.drop_peer(conn, DisconnectReason::ReadError(e.to_string()));
                    return;
                }
            }
        }
    }
}

async fn write_loop(
    conn: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    activity: Arc<Activity>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => match writer.write_all(&frame).await {
                    Ok(()) => activity.mark_sent(Instant::now()),
                    Err(e) => tracing::warn!("Send to {conn:?} failed: {e}"),
                },
                None => break,
            },
            _ = shutdown_rx.changed() => break,
        }
    }
    let _ = writer.shutdown().await;
}

async fn liveness_loop(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    let settings = &shared.settings;
    let mut ticker = tokio::time::interval(settings.liveness_period);
    let ping = shared.codec.ping();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let mut timed_out = Vec::new();
                for (conn, peer) in shared.peers().iter() {
                    match peer.activity.check(now, settings.dropout_timeout, settings.keepalive_interval) {
                        Liveness::TimedOut => timed_out.push(*conn),
                        Liveness::NeedsPing => {
                            let _ = peer.outbound.send(ping.clone());
                        }
                        Liveness::Alive => {}
                    }
                }

                for conn in timed_out {
                    let removed = shared.peers().remove(&conn);
                    if let Some(peer) = removed {
                        let _ = peer.shutdown.send(true);
                        tracing::warn!("Connection {conn:?} ({}) timed out", peer.addr);
                        shared.emit(HostEvent::PeerTimedOut { conn });
                    }
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

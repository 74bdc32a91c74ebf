//! IRC connection lifecycle.
//!
//! [`IrcConnection`] is a cheap, cloneable handle. [`IrcConnection::connect`]
//! spawns a manager task that ranks the configured servers, connects,
//! registers, and runs the receive loop alongside the [`MessageQueue`] drain
//! loop. Every inbound line and lifecycle change is posted as an
//! [`IrcEvent`] on the channel returned by [`IrcConnection::new`].
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Receiving --lost--> Reconnecting
//!       ^                                      |                    |
//!       +----------- disconnect() -------------+      budget left: Connecting
//! ```
//!
//! A lost connection is retried after a fixed delay while the reconnect
//! budget lasts; numeric 001 restores the budget. A user disconnect never
//! reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cncnet_protocol::{FrameError, FrameReader, wrap_ctcp};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};

use crate::events::IrcEvent;
use crate::handler::{Handled, LineHandler};
use crate::queue::{MessageQueue, QueuedMessage, QueuedMessageType};
use crate::reconnection::{ReconnectConfig, ReconnectState};
use crate::servers::{LatencyProbe, Server, ServerSelector};

/// Priority of channel housekeeping commands (JOIN, PART, WHO, NICK).
const SYSTEM_PRIORITY: i32 = 9;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no reconnect pending.
    Disconnected,
    /// Ranking servers or waiting for a TCP handshake.
    Connecting,
    /// TCP connection established, registration sent.
    Connected,
    /// The receive loop is running.
    Receiving,
    /// Waiting out the delay before a reconnect.
    Reconnecting,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Errors from establishing a TCP connection to any candidate server.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// No configured server resolved to an address.
    #[error("no server address could be resolved")]
    NoServers,
    /// Every server and port was tried and none accepted.
    #[error("all connection attempts failed")]
    AllAttemptsFailed,
    /// A newer connect or a disconnect superseded this attempt.
    #[error("connection attempt cancelled")]
    Cancelled,
}

/// Identity and timing parameters for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Nickname to register with.
    pub nick: String,
    /// Ident sent in `USER`.
    pub ident: String,
    /// Real name sent in `USER`.
    pub real_name: String,
    /// Pause between queued sends.
    pub send_sleep: Duration,
    /// Timeout of each TCP connect attempt.
    pub connect_timeout: Duration,
    /// Timeout of each latency probe.
    pub ping_timeout: Duration,
    /// Reconnect delay and budget.
    pub reconnect: ReconnectConfig,
    /// First keep-alive `PING` after this long.
    pub keepalive_idle: Duration,
    /// Keep-alive period once traffic has been exchanged.
    pub keepalive_interval: Duration,
    /// Read errors tolerated before the connection counts as lost.
    pub max_read_errors: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            nick: "Player".to_string(),
            ident: "cncnet".to_string(),
            real_name: "CnCNet client".to_string(),
            send_sleep: Duration::from_millis(1200),
            connect_timeout: Duration::from_secs(3),
            ping_timeout: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
            keepalive_idle: Duration::from_secs(120),
            keepalive_interval: Duration::from_secs(30),
            max_read_errors: 8,
        }
    }
}

/// How a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// `disconnect()` was called.
    Cancelled,
    /// The server closed the link or reads kept failing.
    Lost(String),
}

/// Channels into the live session.
struct SessionHandle {
    shutdown_tx: watch::Sender<bool>,
    instant_tx: mpsc::UnboundedSender<String>,
}

struct Inner {
    settings: ConnectionSettings,
    servers: Vec<Server>,
    probe: Arc<dyn LatencyProbe>,
    queue: Arc<MessageQueue>,
    state: ConnectionStateWatch,
    events: mpsc::UnboundedSender<IrcEvent>,
    generation: AtomicU64,
    nick: Mutex<String>,
    session: Mutex<Option<SessionHandle>>,
}

impl Inner {
    fn emit(&self, event: IrcEvent) {
        let _ = self.events.send(event);
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn session(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_nick(&self, nick: &str) {
        let mut current = self.nick.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != nick {
            *current = nick.to_string();
        }
    }
}

/// Handle to an IRC connection. Clones share the same connection.
#[derive(Clone)]
pub struct IrcConnection {
    inner: Arc<Inner>,
}

impl IrcConnection {
    /// Create a disconnected connection and the receiver for its events.
    pub fn new(
        settings: ConnectionSettings,
        servers: Vec<Server>,
        probe: Arc<dyn LatencyProbe>,
    ) -> (Self, mpsc::UnboundedReceiver<IrcEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let nick = settings.nick.clone();
        let inner = Arc::new(Inner {
            settings,
            servers,
            probe,
            queue: Arc::new(MessageQueue::new()),
            state: ConnectionStateWatch::new(),
            events,
            generation: AtomicU64::new(0),
            nick: Mutex::new(nick),
            session: Mutex::new(None),
        });
        (Self { inner }, rx)
    }

    /// Start connecting in the background.
    ///
    /// Does nothing while a connection is being established or is up. During
    /// a reconnect delay, this replaces the pending reconnect.
    pub fn connect(&self) {
        match self.inner.state.current() {
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Receiving => {
                tracing::debug!("Connect requested while already connected");
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {}
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.state.set(ConnectionState::Connecting);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_manager(inner, generation).await;
        });
    }

    /// Send `QUIT` and close the connection without reconnecting.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);

        let had_session = {
            let session = self.inner.session();
            match session.as_ref() {
                Some(handle) => {
                    let _ = handle.instant_tx.send("QUIT".to_string());
                    let _ = handle.shutdown_tx.send(true);
                    true
                }
                None => false,
            }
        };

        if !had_session && self.inner.state.current() != ConnectionState::Disconnected {
            self.inner.state.set(ConnectionState::Disconnected);
            self.inner.emit(IrcEvent::Disconnected);
        }
        self.inner.queue.clear();
    }

    /// Queue `message`, or write it at once if its type is `Instant`.
    pub fn queue_message(&self, message: QueuedMessage) {
        if message.message_type == QueuedMessageType::Instant {
            self.send_instant(message.command);
            return;
        }
        if self.inner.state.current() == ConnectionState::Disconnected {
            tracing::debug!("Dropping {:?} while disconnected", message.command);
            return;
        }
        self.inner.queue.enqueue(message);
    }

    /// Write `line` to the socket immediately, bypassing the queue.
    pub fn send_instant(&self, line: impl Into<String>) {
        let line = line.into().replace(['\r', '\n'], " ");
        match self.inner.session().as_ref() {
            Some(handle) => {
                let _ = handle.instant_tx.send(line);
            }
            None => tracing::debug!("Dropping instant {line:?}: not connected"),
        }
    }

    /// Queue a `PRIVMSG`.
    pub fn send_chat(&self, target: &str, text: &str, priority: i32) {
        self.queue_message(QueuedMessage::new(
            format!("PRIVMSG {target} :{text}"),
            QueuedMessageType::Chat,
            priority,
        ));
    }

    /// Queue a CTCP-quoted `NOTICE` carrying `payload`.
    pub fn send_ctcp(
        &self,
        target: &str,
        payload: &str,
        message_type: QueuedMessageType,
        priority: i32,
    ) {
        self.queue_message(QueuedMessage::new(
            format!("NOTICE {target} :{}", wrap_ctcp(payload)),
            message_type,
            priority,
        ));
    }

    /// Join `channel`, with an optional key.
    pub fn join_channel(&self, channel: &str, key: Option<&str>) {
        let command = match key {
            Some(key) if !key.is_empty() => format!("JOIN {channel} {key}"),
            _ => format!("JOIN {channel}"),
        };
        self.queue_system(command);
    }

    /// Leave `channel`.
    pub fn leave_channel(&self, channel: &str) {
        self.queue_system(format!("PART {channel}"));
    }

    /// Remove `nick` from `channel` (requires operator status).
    pub fn kick_user(&self, channel: &str, nick: &str) {
        self.queue_system(format!("KICK {channel} {nick}"));
    }

    /// Request WHO information for a channel or nickname.
    pub fn request_who(&self, target: &str) {
        self.queue_system(format!("WHO {target}"));
    }

    /// Ask the server to change our nickname.
    pub fn change_nick(&self, nick: &str) {
        self.queue_system(format!("NICK {nick}"));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.current()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Our nickname as last confirmed by the server.
    pub fn nick(&self) -> String {
        self.inner
            .nick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The outbound queue.
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.inner.queue
    }

    fn queue_system(&self, command: String) {
        self.queue_message(QueuedMessage::new(
            command,
            QueuedMessageType::System,
            SYSTEM_PRIORITY,
        ));
    }
}

/// Feed one line through `handler`, restoring the reconnect budget on welcome.
fn process_line(handler: &mut LineHandler, reconnect: &mut ReconnectState, line: &str) -> Handled {
    let handled = handler.handle_line(line);
    if handled.welcomed {
        reconnect.reset();
    }
    handled
}

async fn run_manager(inner: Arc<Inner>, generation: u64) {
    let mut reconnect = ReconnectState::new(inner.settings.reconnect.clone());
    let mut selector = ServerSelector::new();

    loop {
        inner.state.set(ConnectionState::Connecting);
        let stream = match connect_any(&inner, &mut selector, generation).await {
            Ok(stream) => stream,
            Err(ConnectError::Cancelled) => return,
            Err(e) if reconnect.attempts() == 0 => {
                tracing::warn!("Connecting failed: {e}");
                inner.state.set(ConnectionState::Disconnected);
                inner.emit(IrcEvent::ConnectAttemptFailed);
                return;
            }
            Err(e) => {
                tracing::warn!("Reconnecting failed: {e}");
                if !wait_for_reconnect(&inner, &mut reconnect, generation).await {
                    return;
                }
                continue;
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (instant_tx, instant_rx) = mpsc::unbounded_channel();
        {
            let mut session = inner.session();
            if inner.generation() != generation {
                return;
            }
            *session = Some(SessionHandle {
                shutdown_tx,
                instant_tx,
            });
        }

        let end = run_session(&inner, stream, shutdown_rx, instant_rx, &mut reconnect).await;

        if let Some(handle) = inner.session().take() {
            let _ = handle.shutdown_tx.send(true);
        }
        inner.queue.clear();

        match end {
            SessionEnd::Cancelled => {
                tracing::info!("Disconnected");
                inner.state.set(ConnectionState::Disconnected);
                inner.emit(IrcEvent::Disconnected);
                return;
            }
            SessionEnd::Lost(reason) => {
                tracing::warn!("Connection lost: {reason}");
                inner.emit(IrcEvent::ConnectionLost { reason });
                if !wait_for_reconnect(&inner, &mut reconnect, generation).await {
                    return;
                }
            }
        }
    }
}

/// Wait the reconnect delay. Returns `false` when the manager should stop.
async fn wait_for_reconnect(inner: &Inner, reconnect: &mut ReconnectState, generation: u64) -> bool {
    let Some(delay) = reconnect.next_delay() else {
        tracing::warn!("Reconnect budget exhausted after {} attempts", reconnect.attempts());
        inner.state.set(ConnectionState::Disconnected);
        inner.emit(IrcEvent::ReconnectBudgetExhausted);
        return false;
    };

    inner.state.set(ConnectionState::Reconnecting);
    tokio::time::sleep(delay).await;

    if inner.generation() != generation {
        tracing::debug!("Reconnect superseded by a manual connect or disconnect");
        return false;
    }
    tracing::info!("Reconnect attempt {}", reconnect.attempts());
    inner.emit(IrcEvent::ReconnectAttempt {
        attempt: reconnect.attempts(),
    });
    true
}

async fn connect_any(
    inner: &Inner,
    selector: &mut ServerSelector,
    generation: u64,
) -> Result<TcpStream, ConnectError> {
    let candidates = selector
        .rank(&inner.servers, Arc::clone(&inner.probe), inner.settings.ping_timeout)
        .await;
    if candidates.is_empty() {
        return Err(ConnectError::NoServers);
    }

    for candidate in candidates {
        inner.emit(IrcEvent::AttemptedServerChanged {
            display_name: candidate.server.display_name.clone(),
        });

        for port in &candidate.server.ports {
            if inner.generation() != generation {
                return Err(ConnectError::Cancelled);
            }
            let addr = (candidate.address, *port);
            match tokio::time::timeout(inner.settings.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Failed to set TCP_NODELAY: {e}");
                    }
                    tracing::info!(
                        "Connected to {} ({}:{port})",
                        candidate.server.display_name,
                        candidate.address
                    );
                    inner.emit(IrcEvent::Connected {
                        server: candidate.server.display_name.clone(),
                    });
                    return Ok(stream);
                }
                Ok(Err(e)) => tracing::debug!("Connect to {}:{port} failed: {e}", candidate.address),
                Err(_) => tracing::debug!("Connect to {}:{port} timed out", candidate.address),
            }
        }

        selector.mark_failed(candidate.address);
    }

    Err(ConnectError::AllAttemptsFailed)
}

async fn write_line(writer: &tokio::sync::Mutex<OwnedWriteHalf>, line: &str) -> std::io::Result<()> {
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\r\n").await?;
    w.flush().await
}

fn is_fatal_read_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}

async fn run_session(
    inner: &Arc<Inner>,
    stream: TcpStream,
    mut shutdown_rx: watch::Receiver<bool>,
    mut instant_rx: mpsc::UnboundedReceiver<String>,
    reconnect: &mut ReconnectState,
) -> SessionEnd {
    let settings = &inner.settings;
    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(write_half));

    let nick = inner.nick.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let registration = [
        format!("USER {} 0 * :{}", settings.ident, settings.real_name),
        format!("NICK {nick}"),
    ];
    for line in &registration {
        if let Err(e) = write_line(&writer, line).await {
            tracing::warn!("Failed to send registration: {e}");
        }
    }
    inner.state.set(ConnectionState::Connected);

    let drain_queue = Arc::clone(&inner.queue);
    let drain_writer = Arc::clone(&writer);
    let drain_shutdown = shutdown_rx.clone();
    let send_sleep = settings.send_sleep;
    let drain = tokio::spawn(async move {
        drain_queue.drain_loop(&drain_writer, send_sleep, drain_shutdown).await;
    });

    let mut reader = FrameReader::new(read_half, b'\n');
    let mut handler = LineHandler::new(&nick);
    let mut read_errors = 0u32;
    let started = tokio::time::Instant::now();
    let mut traffic_seen = false;
    let mut keepalive = tokio::time::interval_at(
        started + settings.keepalive_idle,
        settings.keepalive_idle,
    );

    inner.state.set(ConnectionState::Receiving);

    let end = 'session: loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    while let Ok(line) = instant_rx.try_recv() {
                        let _ = write_line(&writer, &line).await;
                    }
                    break 'session SessionEnd::Cancelled;
                }
            }

            Some(line) = instant_rx.recv() => {
                if let Err(e) = write_line(&writer, &line).await {
                    tracing::warn!("Failed to send {line:?}: {e}");
                }
            }

            _ = keepalive.tick() => {
                let lag = format!("PING :LAG{}", started.elapsed().as_millis());
                if let Err(e) = write_line(&writer, &lag).await {
                    tracing::debug!("Keep-alive failed: {e}");
                }
            }

            result = reader.read_frames() => match result {
                Ok(lines) => {
                    read_errors = 0;
                    if !traffic_seen {
                        traffic_seen = true;
                        keepalive = tokio::time::interval_at(
                            tokio::time::Instant::now() + settings.keepalive_interval,
                            settings.keepalive_interval,
                        );
                    }
                    for line in lines {
                        tracing::trace!("<< {line}");
                        let handled = process_line(&mut handler, reconnect, &line);
                        if let Some(reply) = &handled.reply
                            && let Err(e) = write_line(&writer, reply).await
                        {
                            tracing::debug!("Failed to reply {reply:?}: {e}");
                        }
                        for event in handled.events {
                            inner.emit(event);
                        }
                        inner.set_nick(handler.nick());
                        if handled.fatal {
                            break 'session SessionEnd::Lost("server closed the link".to_string());
                        }
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    break 'session SessionEnd::Lost("connection closed by server".to_string());
                }
                Err(FrameError::Io(e)) if is_fatal_read_error(&e) => {
                    break 'session SessionEnd::Lost(e.to_string());
                }
                Err(e) => {
                    read_errors += 1;
                    tracing::warn!("Read error {read_errors}/{}: {e}", settings.max_read_errors);
                    if read_errors > settings.max_read_errors {
                        break 'session SessionEnd::Lost(e.to_string());
                    }
                }
            },
        }
    };

    if let Some(handle) = inner.session().as_ref() {
        let _ = handle.shutdown_tx.send(true);
    }
    let _ = drain.await;
    inner.queue.clear();
    let _ = writer.lock().await.shutdown().await;
    end
}

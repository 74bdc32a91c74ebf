//! LAN lobby client: one TCP connection to the host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cncnet_protocol::{FrameError, FrameReader};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::error::LanError;
use crate::frames::{ClientCommand, ClientFrameDecoder, LanCodec};
use crate::liveness::{Activity, Liveness};
use crate::platform::{SocketConfig, configure_stream};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Field separator.
    pub data_separator: u8,
    /// Frame terminator.
    pub message_separator: u8,
    /// Host silence after which the client gives up. Default: 20 s.
    pub host_timeout: Duration,
    /// Send a `PING` when nothing was sent for this long. Default: 5 s.
    pub keepalive_interval: Duration,
    /// TCP connect timeout. Default: 5 s.
    pub connect_timeout: Duration,
    /// Period of the liveness task. Default: 1 s.
    pub liveness_period: Duration,
    /// Socket options.
    pub socket: SocketConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            data_separator: 0x01,
            message_separator: 0x02,
            host_timeout: Duration::from_secs(20),
            keepalive_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            liveness_period: Duration::from_secs(1),
            socket: SocketConfig::default(),
        }
    }
}

/// Something that happened on the connection to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The host sent a command.
    Command(ClientCommand),
    /// The host closed the connection (this is also how a rejected join looks).
    Disconnected,
    /// Nothing arrived from the host within the timeout.
    HostTimedOut,
}

struct Shared {
    events: mpsc::UnboundedSender<ClientEvent>,
    shutdown_tx: watch::Sender<bool>,
    ended: AtomicBool,
}

impl Shared {
    /// Post the one terminal event and stop every task.
    fn end(&self, event: ClientEvent) {
        if !self.ended.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(event);
        }
        let _ = self.shutdown_tx.send(true);
    }
}

/// Connection to a LAN lobby host.
pub struct LanClient {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    codec: LanCodec,
    host_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl LanClient {
    /// Connect to `host` and send the join handshake.
    pub async fn connect(
        host: SocketAddr,
        settings: ClientSettings,
        name: &str,
        game_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), LanError> {
        let stream = match tokio::time::timeout(settings.connect_timeout, TcpStream::connect(host)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(LanError::Connect { addr: host, source }),
            Err(_) => return Err(LanError::ConnectTimeout(host)),
        };
        configure_stream(&stream, &settings.socket)?;
        let local_addr = stream.local_addr()?;
        tracing::info!("Connected to LAN host {host}");

        let codec = LanCodec::new(settings.data_separator, settings.message_separator);
        let (events, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            events,
            shutdown_tx,
            ended: AtomicBool::new(false),
        });
        let activity = Arc::new(Activity::new(Instant::now()));

        let (read, write) = stream.into_split();
        tokio::spawn(write_loop(write, outbound_rx, Arc::clone(&activity), shutdown_rx.clone()));
        tokio::spawn(read_loop(
            Arc::clone(&shared),
            FrameReader::new(read, settings.message_separator),
            ClientFrameDecoder::new(settings.data_separator),
            host.to_string(),
            Arc::clone(&activity),
            shutdown_rx.clone(),
        ));
        tokio::spawn(liveness_loop(
            Arc::clone(&shared),
            outbound.clone(),
            codec.ping(),
            activity,
            settings,
            shutdown_rx,
        ));

        let client = Self {
            shared,
            outbound,
            codec,
            host_addr: host,
            local_addr,
        };
        client.send(codec.join(name, game_id));
        Ok((client, rx))
    }

    /// Frame encoder using this connection's separators.
    pub fn codec(&self) -> LanCodec {
        self.codec
    }

    /// The host's address.
    pub fn host_addr(&self) -> SocketAddr {
        self.host_addr
    }

    /// Our side of the connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queue `frame` to the host. Failures are logged, not retried.
    pub fn send(&self, frame: Vec<u8>) {
        if self.outbound.send(frame).is_err() {
            tracing::debug!("Send to {} skipped: connection closed", self.host_addr);
        }
    }

    /// Whether the connection has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    /// Send `QUIT` and close without posting an event.
    pub fn leave(&self) {
        self.send(self.codec.quit());
        self.shared.ended.store(true, Ordering::Release);
        let _ = self.shared.shutdown_tx.send(true);
    }
}

impl Drop for LanClient {
    fn drop(&mut self) {
        self.shared.ended.store(true, Ordering::Release);
        let _ = self.shared.shutdown_tx.send(true);
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut reader: FrameReader<OwnedReadHalf>,
    decoder: ClientFrameDecoder,
    sender: String,
    activity: Arc<Activity>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            result = reader.read_frames() => match result {
                Ok(frames) => {
                    activity.mark_received(Instant::now());
                    for frame in &frames {
                        match decoder.decode(&sender, frame) {
                            Some(ClientCommand::Ping) | None => {}
                            Some(command) => {
                                let _ = shared.events.send(ClientEvent::Command(command));
                            }
                        }
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    tracing::info!("LAN host {sender} closed the connection");
                    shared.end(ClientEvent::Disconnected);
                    return;
                }
                Err(e) => {
                    tracing::warn!("Read from LAN host {sender} failed: {e}");
                    shared.end(ClientEvent::Disconnected);
                    return;
                }
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    activity: Arc<Activity>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => match writer.write_all(&frame).await {
                    Ok(()) => activity.mark_sent(Instant::now()),
                    Err(e) => tracing::warn!("Send to LAN host failed: {e}"),
                },
                None => break,
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    // Frames queued before shutdown (such as QUIT) still go out.
    while let Ok(frame) = outbound.try_recv() {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn liveness_loop(
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    ping: Vec<u8>,
    activity: Arc<Activity>,
    settings: ClientSettings,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(settings.liveness_period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match activity.check(Instant::now(), settings.host_timeout, settings.keepalive_interval) {
                    Liveness::TimedOut => {
                        tracing::warn!("LAN host timed out");
                        shared.end(ClientEvent::HostTimedOut);
                        return;
                    }
                    Liveness::NeedsPing => {
                        let _ = outbound.send(ping.clone());
                    }
                    Liveness::Alive => {}
                }
            }
            _ = shutdown_rx.changed() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn settings() -> ClientSettings {
        ClientSettings {
            host_timeout: Duration::from_millis(300),
            keepalive_interval: Duration::from_millis(100),
            liveness_period: Duration::from_millis(50),
            ..Default::default()
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_join_sent_first_and_commands_decoded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"PING\x02GAME_START\x02").await.unwrap();
            let mut rest = [0u8; 64];
            let m = stream.read(&mut rest).await.unwrap();
            (buf[..n].to_vec(), rest[..m].to_vec())
        });

        let (client, mut events) = LanClient::connect(addr, settings(), "Alice", "7").await.unwrap();
        assert_eq!(next(&mut events).await, ClientEvent::Command(ClientCommand::GameStart));
        client.send(client.codec().ready_status());

        let (join, rest) = host.await.unwrap();
        assert_eq!(join, b"PLAYER_JOIN\x01Alice\x017\x02");
        assert!(rest.starts_with(b"READY_STATUS\x02"));
    }

    #[tokio::test]
    async fn test_silent_rejection_surfaces_as_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
        });

        let (_client, mut events) = LanClient::connect(addr, settings(), "Mallory", "7").await.unwrap();
        assert_eq!(next(&mut events).await, ClientEvent::Disconnected);
    }

    #[tokio::test]
    async fn test_silent_host_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let (_client, mut events) = LanClient::connect(addr, settings(), "Bob", "7").await.unwrap();
        assert_eq!(next(&mut events).await, ClientEvent::HostTimedOut);
        assert!(events.try_recv().is_err(), "only one terminal event");
    }

    #[tokio::test]
    async fn test_leave_sends_quit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let (client, _events) = LanClient::connect(addr, settings(), "Carol", "7").await.unwrap();
        client.leave();
        let bytes = host.await.unwrap();
        assert!(bytes.ends_with(b"QUIT\x02"), "{bytes:?}");
    }
}

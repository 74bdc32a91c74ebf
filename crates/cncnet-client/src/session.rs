//! Building lobby transports from the loaded configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use cncnet_config::{Config, IrcConfig, LanConfig};
use cncnet_irc::{
    ConnectionSettings, IrcConnection, IrcEvent, ReconnectConfig, Server, TcpConnectProbe,
};
use cncnet_lan::{ClientSettings, HostSettings, LanClient, LanHost, create_broadcast_socket, lobby_bind_address};
use cncnet_loading::{
    AdvertiseSettings, CncnetSettings, CncnetTransport, Collaborators, DirectorySaveStorage,
    InMemoryStatistics, LanClientTransport, LanHostTransport, ProcessLauncher, SaveStorage,
    SavedGameRoster, SessionContext, Sha256FileHasher, TunnelServer,
};
use tokio::sync::mpsc;

use crate::error::AppError;

const WELCOME_TIMEOUT: Duration = Duration::from_secs(60);

pub fn connection_settings(config: &Config) -> ConnectionSettings {
    let irc: &IrcConfig = &config.irc;
    ConnectionSettings {
        nick: config.player.name.clone(),
        ident: config.player.ident.clone(),
        real_name: config.player.real_name.clone(),
        send_sleep: Duration::from_millis(irc.send_sleep_ms),
        connect_timeout: Duration::from_millis(irc.connect_timeout_ms),
        ping_timeout: Duration::from_millis(irc.ping_timeout_ms),
        reconnect: ReconnectConfig {
            delay: Duration::from_millis(irc.reconnect_delay_ms),
            max_attempts: irc.max_reconnect_count,
        },
        keepalive_idle: Duration::from_secs(irc.keepalive_idle_secs),
        keepalive_interval: Duration::from_secs(irc.keepalive_interval_secs),
        max_read_errors: irc.max_read_errors,
    }
}

pub fn servers(config: &Config) -> Vec<Server> {
    config
        .irc
        .servers
        .iter()
        .map(|s| Server::new(s.host.clone(), s.display_name.clone(), s.ports.clone()))
        .collect()
}

fn host_settings(lan: &LanConfig) -> HostSettings {
    HostSettings {
        bind_addr: lobby_bind_address(lan.game_lobby_port),
        data_separator: lan.data_separator,
        message_separator: lan.message_separator,
        dropout_timeout: Duration::from_secs(lan.dropout_timeout_secs),
        keepalive_interval: Duration::from_secs(lan.keepalive_secs),
        ..Default::default()
    }
}

fn client_settings(lan: &LanConfig) -> ClientSettings {
    ClientSettings {
        data_separator: lan.data_separator,
        message_separator: lan.message_separator,
        host_timeout: Duration::from_secs(lan.host_timeout_secs),
        keepalive_interval: Duration::from_secs(lan.keepalive_secs),
        ..Default::default()
    }
}

/// Channel a CnCNet host opens when none is given.
pub fn default_channel(game_id: &str) -> String {
    format!("#cncnet-sg-{game_id}")
}

/// Parse `host[:port]` when `host` is an IP literal.
pub fn parse_host_addr(text: &str, default_port: u16) -> Option<SocketAddr> {
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Some(addr);
    }
    text.parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, default_port))
}

async fn resolve_host(text: &str, default_port: u16) -> Result<SocketAddr, AppError> {
    if let Some(addr) = parse_host_addr(text, default_port) {
        return Ok(addr);
    }
    let target = if text.contains(':') {
        text.to_string()
    } else {
        format!("{text}:{default_port}")
    };
    tokio::net::lookup_host(target)
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| AppError::UnresolvedHost(text.to_string()))
}

pub fn collaborators(ctx: &SessionContext) -> Collaborators {
    Collaborators {
        saves: Box::new(storage(ctx)),
        launcher: Box::new(ProcessLauncher::new()),
        hasher: Box::new(Sha256FileHasher),
        statistics: Box::new(InMemoryStatistics::new()),
    }
}

fn storage(ctx: &SessionContext) -> DirectorySaveStorage {
    DirectorySaveStorage::new(ctx.saved_spawn_path.clone(), ctx.saved_games_dir.clone())
}

/// Roster of the saved game in the local save directory.
pub fn local_roster(ctx: &SessionContext) -> Result<SavedGameRoster, AppError> {
    Ok(storage(ctx).load_roster()?)
}

pub fn lan_host(config: &Config, roster: &SavedGameRoster) -> Result<LanHostTransport, AppError> {
    let lan = &config.lan;
    let (host, events) = LanHost::start(host_settings(lan))?;
    tracing::info!("Hosting LAN lobby on {}", host.local_addr());
    let transport = LanHostTransport::new(host, events, config.player.name.clone(), lan.ingame_port);

    match create_broadcast_socket() {
        Ok(socket) => {
            let settings = AdvertiseSettings {
                target: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), lan.discovery_port),
                interval: Duration::from_secs(lan.advertise_interval_secs),
                revision: lan.protocol_revision.clone(),
                version: config.game.version.clone(),
                game_id: roster.game_id.clone(),
                map: roster.map.clone(),
                mode: roster.mode.clone(),
                max_players: roster.players.len(),
            };
            Ok(transport.with_advertisement(socket, settings))
        }
        Err(e) => {
            tracing::warn!("LAN advertisement disabled: {e}");
            Ok(transport)
        }
    }
}

pub async fn lan_join(
    config: &Config,
    roster: &SavedGameRoster,
    host: &str,
) -> Result<LanClientTransport, AppError> {
    let lan = &config.lan;
    let addr = resolve_host(host, lan.game_lobby_port).await?;
    tracing::info!("Joining LAN lobby at {addr}");
    let (client, events) =
        LanClient::connect(addr, client_settings(lan), &config.player.name, &roster.game_id).await?;
    Ok(LanClientTransport::new(client, events, lan.ingame_port))
}

/// Connect to the best IRC server and wait for registration.
async fn connect_irc(config: &Config) -> Result<(IrcConnection, mpsc::UnboundedReceiver<IrcEvent>), AppError> {
    let (irc, mut events) = IrcConnection::new(
        connection_settings(config),
        servers(config),
        Arc::new(TcpConnectProbe),
    );
    irc.connect();

    let welcome = tokio::time::timeout(WELCOME_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            match event {
                IrcEvent::Welcome { .. } => return true,
                IrcEvent::AttemptedServerChanged { display_name } => {
                    tracing::info!("Trying {display_name}");
                }
                IrcEvent::ReconnectBudgetExhausted | IrcEvent::Disconnected => return false,
                other => tracing::debug!("Before welcome: {other:?}"),
            }
        }
        false
    })
    .await;

    match welcome {
        Ok(true) => Ok((irc, events)),
        _ => {
            irc.disconnect();
            Err(AppError::IrcUnavailable)
        }
    }
}

pub async fn cncnet_host(
    config: &Config,
    roster: &SavedGameRoster,
    channel: Option<String>,
    tunnel: Option<String>,
) -> Result<CncnetTransport, AppError> {
    let channel = channel.unwrap_or_else(|| default_channel(&roster.game_id));
    let (irc, events) = connect_irc(config).await?;
    irc.join_channel(&channel, None);
    tracing::info!("Hosting CnCNet lobby in {channel}");
    let settings = CncnetSettings {
        channel,
        host_nick: irc.nick(),
        is_host: true,
        tunnel: tunnel.as_deref().and_then(TunnelServer::parse),
        known_tunnels: Vec::new(),
        password: None,
    };
    Ok(CncnetTransport::new(irc, events, settings).with_tunnel_latency(Arc::new(TcpConnectProbe)))
}

pub async fn cncnet_join(
    config: &Config,
    channel: String,
    host: String,
    password: Option<String>,
) -> Result<CncnetTransport, AppError> {
    let (irc, events) = connect_irc(config).await?;
    irc.join_channel(&channel, password.as_deref());
    tracing::info!("Joining CnCNet lobby {channel} hosted by {host}");
    let settings = CncnetSettings {
        channel,
        host_nick: host,
        is_host: false,
        tunnel: None,
        known_tunnels: Vec::new(),
        password,
    };
    Ok(CncnetTransport::new(irc, events, settings).with_tunnel_latency(Arc::new(TcpConnectProbe)))
}

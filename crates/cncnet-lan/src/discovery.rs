//! Periodic UDP advertisement of a hosted LAN lobby.
//!
//! ```text
//! GAME <d> revision <d> version <d> gameId <d> map <d> mode <d> p1,p2,... <d> started <d> full <m>
//! ```
//!
//! The owner publishes the latest [`Advertisement`] on a `watch` channel; the
//! loop reads whatever is current on every tick.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::frames::LanCodec;

/// Keyword of an advertisement frame.
pub const GAME: &str = "GAME";

/// State of a hosted lobby as seen by LAN browsers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Advertisement {
    /// LAN protocol revision.
    pub revision: String,
    /// Game version.
    pub version: String,
    /// Identifier of the loaded saved game.
    pub game_id: String,
    /// Map name.
    pub map: String,
    /// Game mode name.
    pub mode: String,
    /// Names of the players currently in the lobby.
    pub players: Vec<String>,
    /// The game has been launched.
    pub started: bool,
    /// The lobby has no free slot.
    pub full: bool,
}

impl Advertisement {
    /// Encode as one terminated frame.
    pub fn encode(&self, codec: &LanCodec) -> Vec<u8> {
        let players = self.players.join(",");
        codec.frame(
            GAME,
            &[
                &self.revision,
                &self.version,
                &self.game_id,
                &self.map,
                &self.mode,
                &players,
                flag(self.started),
                flag(self.full),
            ],
        )
    }

    /// Parse an unterminated frame.
    pub fn parse(frame: &str, separator: u8) -> Option<Self> {
        let fields: Vec<&str> = frame.split(char::from(separator)).collect();
        let [keyword, revision, version, game_id, map, mode, players, started, full] = fields[..] else {
            return None;
        };
        if keyword != GAME {
            return None;
        }
        Some(Self {
            revision: revision.to_string(),
            version: version.to_string(),
            game_id: game_id.to_string(),
            map: map.to_string(),
            mode: mode.to_string(),
            players: players
                .split(',')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            started: started == "1",
            full: full == "1",
        })
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Send the current advertisement to `target` every `interval` until
/// `shutdown` turns `true`. `None` pauses advertising.
pub async fn advertise_loop(
    socket: UdpSocket,
    target: SocketAddr,
    codec: LanCodec,
    interval: Duration,
    advert_rx: watch::Receiver<Option<Advertisement>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let payload = advert_rx.borrow().as_ref().map(|a| a.encode(&codec));
                if let Some(payload) = payload
                    && let Err(e) = socket.send_to(&payload, target).await
                {
                    tracing::debug!("Advertisement to {target} failed: {e}");
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("Advertisement loop stopped");
                break;
            }
        }
    }
}

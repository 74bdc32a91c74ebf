//! Lobby options and start payloads, and their CTCP text encodings.
//!
//! ```text
//! OP     saveIndex;name:ready;name:ready
//! START  name;ip:port;name;ip:port
//! ```
//!
//! `ready` is `1` or `0`. A trailing `;` is accepted.

/// Errors decoding a CTCP payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("empty payload")]
    Empty,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("invalid player entry {0:?}")]
    InvalidPlayer(String),
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("odd number of start fields")]
    UnpairedField,
}

/// One player of an options broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsPlayer {
    pub name: String,
    pub ready: bool,
    /// Address the host sees for the player, when the transport carries it.
    pub address: Option<String>,
}

/// The host's consolidated lobby state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LobbyOptions {
    pub save_index: i32,
    pub players: Vec<OptionsPlayer>,
}

/// Where one player listens in game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartEntry {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

fn fields(payload: &str) -> impl Iterator<Item = &str> {
    let trimmed = payload.strip_suffix(';').unwrap_or(payload);
    trimmed.split(';')
}

pub fn encode_options(options: &LobbyOptions) -> String {
    let mut out = options.save_index.to_string();
    for player in &options.players {
        out.push(';');
        out.push_str(&player.name);
        out.push(':');
        out.push(if player.ready { '1' } else { '0' });
    }
    out
}

pub fn parse_options(payload: &str) -> Result<LobbyOptions, PayloadError> {
    if payload.is_empty() {
        return Err(PayloadError::Empty);
    }
    let mut parts = fields(payload);
    let index = parts.next().unwrap_or_default();
    let save_index = index
        .parse()
        .map_err(|_| PayloadError::InvalidNumber(index.to_string()))?;

    let mut players = Vec::new();
    for part in parts {
        let invalid = || PayloadError::InvalidPlayer(part.to_string());
        let (name, ready) = part.rsplit_once(':').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let ready = match ready {
            "1" => true,
            "0" => false,
            _ => return Err(invalid()),
        };
        players.push(OptionsPlayer {
            name: name.to_string(),
            ready,
            address: None,
        });
    }
    Ok(LobbyOptions { save_index, players })
}

pub fn encode_start(entries: &[StartEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{};{}:{}", e.name, e.ip, e.port))
        .collect::<Vec<_>>()
        .join(";")
}

pub fn parse_start(payload: &str) -> Result<Vec<StartEntry>, PayloadError> {
    if payload.is_empty() {
        return Err(PayloadError::Empty);
    }
    let parts: Vec<&str> = fields(payload).collect();
    if parts.len() % 2 != 0 {
        return Err(PayloadError::UnpairedField);
    }
    parts
        .chunks_exact(2)
        .map(|pair| {
            let (name, endpoint) = (pair[0], pair[1]);
            if name.is_empty() {
                return Err(PayloadError::InvalidPlayer(name.to_string()));
            }
            let invalid = || PayloadError::InvalidEndpoint(endpoint.to_string());
            let (ip, port) = endpoint.rsplit_once(':').ok_or_else(invalid)?;
            if ip.is_empty() {
                return Err(invalid());
            }
            Ok(StartEntry {
                name: name.to_string(),
                ip: ip.to_string(),
                port: port.parse().map_err(|_| invalid())?,
            })
        })
        .collect()
}

//! LAN wire frames.
//!
//! A frame is a keyword followed by fields, all joined by the data separator
//! and terminated by the message separator:
//!
//! ```text
//! PLAYER_JOIN <d> name <d> savedGameId <m>
//! OPTIONS <d> saveIndex ( <d> name <d> ready <d> ip )* <m>
//! CHAT <d> color <d> text <m>                client -> host
//! CHAT <d> sender <d> color <d> text <m>     host -> clients
//! GAME_START <m>   READY_STATUS <m>   QUIT <m>   PING <m>
//! FILE_HASH <d> hash <m>
//! ```
//!
//! Host and client decode with separate [`CommandTable`]s, since each side
//! accepts a different vocabulary.

use cncnet_protocol::CommandTable;

/// Join handshake keyword.
pub const PLAYER_JOIN: &str = "PLAYER_JOIN";
/// Options broadcast keyword.
pub const OPTIONS: &str = "OPTIONS";
/// Chat keyword.
pub const CHAT: &str = "CHAT";
/// Start signal keyword.
pub const GAME_START: &str = "GAME_START";
/// File hash keyword.
pub const FILE_HASH: &str = "FILE_HASH";
/// Ready toggle keyword.
pub const READY_STATUS: &str = "READY_STATUS";
/// Leave keyword.
pub const QUIT: &str = "QUIT";
/// Keep-alive keyword.
pub const PING: &str = "PING";

/// A frame received by the host from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Chat text to relay.
    Chat {
        /// Sender's color index.
        color: i32,
        /// Message text.
        text: String,
    },
    /// The client is leaving.
    Quit,
    /// Toggle the client's ready flag.
    ReadyStatus,
    /// Hash of the client's game files.
    FileHash(String),
    /// Keep-alive.
    Ping,
}

/// A frame received by a client from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Chat relayed by the host.
    Chat {
        /// Sender name.
        sender: String,
        /// Sender's color index.
        color: i32,
        /// Message text.
        text: String,
    },
    /// Consolidated lobby state.
    Options(LanOptions),
    /// Every player is ready; load the game.
    GameStart,
    /// Keep-alive.
    Ping,
}

/// One player entry of an `OPTIONS` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanOptionsPlayer {
    /// Player name.
    pub name: String,
    /// Ready flag.
    pub ready: bool,
    /// Address the host sees for this player.
    pub address: String,
}

/// Payload of an `OPTIONS` frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanOptions {
    /// Selected saved-game index.
    pub save_index: i32,
    /// Players in roster order.
    pub players: Vec<LanOptionsPlayer>,
}

impl LanOptions {
    /// Parse the part after `OPTIONS<sep>`. Returns `None` on a wrong field
    /// count or unparsable values.
    pub fn parse(payload: &str, separator: char) -> Option<Self> {
        let mut fields = payload.split(separator);
        let save_index = fields.next()?.parse().ok()?;
        let rest: Vec<&str> = fields.collect();
        if rest.len() % 3 != 0 {
            return None;
        }

        let players = rest
            .chunks_exact(3)
            .map(|chunk| {
                let ready = match chunk[1] {
                    "1" => true,
                    "0" => false,
                    _ => return None,
                };
                Some(LanOptionsPlayer {
                    name: chunk[0].to_string(),
                    ready,
                    address: chunk[2].to_string(),
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            save_index,
            players,
        })
    }
}

/// Encodes frames with a fixed pair of separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanCodec {
    data: u8,
    message: u8,
}

impl LanCodec {
    /// Create a codec. Both separators must be ASCII.
    pub fn new(data_separator: u8, message_separator: u8) -> Self {
        Self {
            data: data_separator,
            message: message_separator,
        }
    }

    /// The field separator.
    pub fn data_separator(&self) -> u8 {
        self.data
    }

    /// The frame terminator.
    pub fn message_separator(&self) -> u8 {
        self.message
    }

    /// Join `keyword` and `fields` into a terminated frame.
    ///
    /// Separator bytes inside fields are replaced with spaces.
    pub fn frame(&self, keyword: &str, fields: &[&str]) -> Vec<u8> {
        let mut out = Vec::with_capacity(keyword.len() + fields.iter().map(|f| f.len() + 1).sum::<usize>() + 1);
        out.extend_from_slice(keyword.as_bytes());
        for field in fields {
            out.push(self.data);
            out.extend(field.bytes().map(|b| {
                if b == self.data || b == self.message {
                    b' '
                } else {
                    b
                }
            }));
        }
        out.push(self.message);
        out
    }

    /// `PLAYER_JOIN` handshake.
    pub fn join(&self, name: &str, game_id: &str) -> Vec<u8> {
        self.frame(PLAYER_JOIN, &[name, game_id])
    }

    /// `OPTIONS` broadcast.
    pub fn options(&self, options: &LanOptions) -> Vec<u8> {
        let index = options.save_index.to_string();
        let mut fields: Vec<&str> = vec![&index];
        for p in &options.players {
            fields.push(&p.name);
            fields.push(if p.ready { "1" } else { "0" });
            fields.push(&p.address);
        }
        self.frame(OPTIONS, &fields)
    }

    /// Client chat request to the host.
    pub fn client_chat(&self, color: i32, text: &str) -> Vec<u8> {
        self.frame(CHAT, &[&color.to_string(), text])
    }

    /// Host chat relay to clients.
    pub fn relayed_chat(&self, sender: &str, color: i32, text: &str) -> Vec<u8> {
        self.frame(CHAT, &[sender, &color.to_string(), text])
    }

    /// `GAME_START`.
    pub fn game_start(&self) -> Vec<u8> {
        self.frame(GAME_START, &[])
    }

    /// `FILE_HASH`.
    pub fn file_hash(&self, hash: &str) -> Vec<u8> {
        self.frame(FILE_HASH, &[hash])
    }

    /// `READY_STATUS`.
    pub fn ready_status(&self) -> Vec<u8> {
        self.frame(READY_STATUS, &[])
    }

    /// `QUIT`.
    pub fn quit(&self) -> Vec<u8> {
        self.frame(QUIT, &[])
    }

    /// `PING`.
    pub fn ping(&self) -> Vec<u8> {
        self.frame(PING, &[])
    }
}

/// Split a `PLAYER_JOIN` frame into `(name, saved game id)`.
pub fn parse_join(frame: &str, separator: u8) -> Option<(String, String)> {
    let sep = char::from(separator);
    let mut fields = frame.split(sep);
    if fields.next()? != PLAYER_JOIN {
        return None;
    }
    let name = fields.next()?;
    let game_id = fields.next()?;
    if fields.next().is_some() {
        return None;
    }
    Some((name.to_string(), game_id.to_string()))
}

/// Decodes frames the host receives from clients.
pub struct HostFrameDecoder {
    table: CommandTable<Option<HostCommand>>,
}

impl HostFrameDecoder {
    /// Build the host table for `separator`.
    pub fn new(separator: u8) -> Self {
        let sep = char::from(separator);
        let table = CommandTable::new(sep)
            .no_param(QUIT, |out: &mut Option<HostCommand>, _| *out = Some(HostCommand::Quit))
            .no_param(READY_STATUS, |out: &mut Option<HostCommand>, _| {
                *out = Some(HostCommand::ReadyStatus);
            })
            .no_param(PING, |out: &mut Option<HostCommand>, _| *out = Some(HostCommand::Ping))
            .string_param(FILE_HASH, |out: &mut Option<HostCommand>, _, hash| {
                *out = Some(HostCommand::FileHash(hash.to_string()));
            })
            .string_param(CHAT, move |out: &mut Option<HostCommand>, sender, rest| {
                match rest.split_once(sep).and_then(|(c, t)| Some((c.parse().ok()?, t))) {
                    Some((color, text)) => {
                        *out = Some(HostCommand::Chat {
                            color,
                            text: text.to_string(),
                        });
                    }
                    None => tracing::debug!("Malformed chat from {sender}: {rest:?}"),
                }
            });
        Self { table }
    }

    /// Decode one frame, or `None` if it is unknown or malformed.
    pub fn decode(&self, sender: &str, frame: &str) -> Option<HostCommand> {
        let mut out = None;
        self.table.dispatch(&mut out, sender, frame);
        out
    }
}

/// Decodes frames a client receives from the host.
pub struct ClientFrameDecoder {
    table: CommandTable<Option<ClientCommand>>,
}

impl ClientFrameDecoder {
    /// Build the client table for `separator`.
    pub fn new(separator: u8) -> Self {
        let sep = char::from(separator);
        let table = CommandTable::new(sep)
            .no_param(GAME_START, |out: &mut Option<ClientCommand>, _| {
                *out = Some(ClientCommand::GameStart);
            })
            .no_param(PING, |out: &mut Option<ClientCommand>, _| *out = Some(ClientCommand::Ping))
            .string_param(OPTIONS, move |out: &mut Option<ClientCommand>, sender, rest| {
                match LanOptions::parse(rest, sep) {
                    Some(options) => *out = Some(ClientCommand::Options(options)),
                    None => tracing::debug!("Malformed options from {sender}: {rest:?}"),
                }
            })
            .string_param(CHAT, move |out: &mut Option<ClientCommand>, sender, rest| {
                let mut fields = rest.splitn(3, sep);
                match (fields.next(), fields.next().and_then(|c| c.parse().ok()), fields.next()) {
                    (Some(name), Some(color), Some(text)) => {
                        *out = Some(ClientCommand::Chat {
                            sender: name.to_string(),
                            color,
                            text: text.to_string(),
                        });
                    }
                    _ => tracing::debug!("Malformed chat from {sender}: {rest:?}"),
                }
            });
        Self { table }
    }

    /// Decode one frame, or `None` if it is unknown or malformed.
    pub fn decode(&self, sender: &str, frame: &str) -> Option<ClientCommand> {
        let mut out = None;
        self.table.dispatch(&mut out, sender, frame);
        out
    }
}

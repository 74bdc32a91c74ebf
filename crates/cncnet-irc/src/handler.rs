//! Converts parsed lines into [`IrcEvent`]s.
//!
//! Numerics are dispatched by code, keywords by name. CTCP-quoted
//! `NOTICE`/`PRIVMSG` payloads are routed to [`IrcEvent::Ctcp`] instead of
//! the chat path. The handler performs no I/O: replies the connection must
//! write (such as `PONG`) are returned in [`Handled`].

use std::collections::HashMap;

use cncnet_protocol::unwrap_ctcp;

use crate::events::IrcEvent;
use crate::message::IrcMessage;

/// Result of handling one line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Handled {
    /// Events to post to the consumer.
    pub events: Vec<IrcEvent>,
    /// Line to send back immediately, bypassing the queue.
    pub reply: Option<String>,
    /// Numeric 001 was received.
    pub welcomed: bool,
    /// The server is closing the link.
    pub fatal: bool,
}

impl Handled {
    fn event(event: IrcEvent) -> Self {
        Self {
            events: vec![event],
            ..Default::default()
        }
    }
}

/// Stateful line dispatcher for one connection.
pub struct LineHandler {
    nick: String,
    pending_names: HashMap<String, Vec<String>>,
}

impl LineHandler {
    /// Create a handler for a session registered as `nick`.
    pub fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            pending_names: HashMap::new(),
        }
    }

    /// Our current nickname as known to the server.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Parse and handle a raw line. Malformed lines are logged and skipped.
    pub fn handle_line(&mut self, line: &str) -> Handled {
        match IrcMessage::parse(line) {
            Ok(msg) => self.handle(&msg),
            Err(e) => {
                tracing::debug!("Skipping malformed line {line:?}: {e}");
                Handled::default()
            }
        }
    }

    /// Handle a parsed message.
    pub fn handle(&mut self, msg: &IrcMessage) -> Handled {
        match msg.numeric() {
            Some(code) => self.handle_numeric(code, msg),
            None => self.handle_command(msg),
        }
    }

    fn handle_numeric(&mut self, code: u16, msg: &IrcMessage) -> Handled {
        let p = |i| msg.param(i).to_string();
        match code {
            1 => {
                if !msg.param(0).is_empty() {
                    self.nick = p(0);
                }
                Handled {
                    events: vec![IrcEvent::Welcome {
                        message: msg.last_param().to_string(),
                    }],
                    welcomed: true,
                    ..Default::default()
                }
            }
            2..=5 | 251 | 252 | 254 | 255 | 265 | 266 | 372 | 375 | 376 => {
                let message = msg.params.iter().skip(1).cloned().collect::<Vec<_>>().join(" ");
                Handled::event(IrcEvent::ServerMessage { message })
            }
            301 => Handled::event(IrcEvent::Away {
                nick: p(1),
                message: msg.last_param().to_string(),
            }),
            311 => Handled::event(IrcEvent::WhoisUser {
                nick: p(1),
                ident: p(2),
                host: p(3),
                real_name: msg.last_param().to_string(),
            }),
            332 => Handled::event(IrcEvent::Topic {
                channel: p(1),
                topic: msg.last_param().to_string(),
            }),
            352 => Handled::event(IrcEvent::WhoReply {
                channel: p(1),
                ident: p(2),
                host: p(3),
                nick: p(5),
                extra: msg.last_param().to_string(),
            }),
            353 => {
                let channel = p(2);
                let names = self.pending_names.entry(channel).or_default();
                names.extend(
                    msg.last_param()
                        .split_whitespace()
                        .map(|n| n.trim_start_matches(['@', '+', '%', '~', '&']).to_string())
                        .filter(|n| !n.is_empty()),
                );
                Handled::default()
            }
            366 => {
                let channel = p(1);
                let users = self.pending_names.remove(&channel).unwrap_or_default();
                Handled::event(IrcEvent::UserList { channel, users })
            }
            401 => Handled::event(IrcEvent::NoSuchNick { nick: p(1) }),
            403 => Handled::event(IrcEvent::NoSuchChannel { channel: p(1) }),
            404 => Handled::event(IrcEvent::CannotSendToChannel { channel: p(1) }),
            432 => Handled::event(IrcEvent::ErroneousNickname { nick: p(1) }),
            433 => Handled::event(IrcEvent::NameAlreadyInUse { nick: p(1) }),
            439 => Handled::event(IrcEvent::TargetChangeTooFast {
                target: p(1),
                message: msg.last_param().to_string(),
            }),
            451 => Handled::event(IrcEvent::NotRegistered),
            461 => Handled::event(IrcEvent::NeedMoreParams { command: p(1) }),
            465 => Handled::event(IrcEvent::BannedFromServer {
                message: msg.last_param().to_string(),
            }),
            471 => Handled::event(IrcEvent::ChannelFull { channel: p(1) }),
            473 => Handled::event(IrcEvent::ChannelInviteOnly { channel: p(1) }),
            474 => Handled::event(IrcEvent::BannedFromChannel { channel: p(1) }),
            475 => Handled::event(IrcEvent::IncorrectChannelPassword { channel: p(1) }),
            _ => {
                tracing::trace!("Unhandled numeric {code:03}: {:?}", msg.params);
                Handled::default()
            }
        }
    }

    fn handle_command(&mut self, msg: &IrcMessage) -> Handled {
        let source = msg.source();
        match msg.command.to_ascii_uppercase().as_str() {
            "NOTICE" => {
                let target = msg.param(0).to_string();
                let text = msg.last_param();
                if let Some(payload) = unwrap_ctcp(text) {
                    return Handled::event(IrcEvent::Ctcp {
                        sender: source.nick,
                        target,
                        payload: payload.to_string(),
                    });
                }
                Handled::event(IrcEvent::Notice {
                    sender: source.nick,
                    target,
                    message: text.to_string(),
                })
            }
            "PRIVMSG" => {
                let target = msg.param(0).to_string();
                let text = msg.last_param();
                if let Some(payload) = unwrap_ctcp(text) {
                    return Handled::event(IrcEvent::Ctcp {
                        sender: source.nick,
                        target,
                        payload: payload.to_string(),
                    });
                }
                if target.starts_with('#') {
                    Handled::event(IrcEvent::ChatMessage {
                        channel: target,
                        nick: source.nick,
                        ident: source.ident.unwrap_or_default(),
                        message: text.to_string(),
                    })
                } else {
                    Handled::event(IrcEvent::PrivateMessage {
                        nick: source.nick,
                        message: text.to_string(),
                    })
                }
            }
            "JOIN" => Handled::event(IrcEvent::UserJoinedChannel {
                channel: msg.param(0).to_string(),
                nick: source.nick,
                ident: source.ident.unwrap_or_default(),
                host: source.host.unwrap_or_default(),
            }),
            "PART" => Handled::event(IrcEvent::UserLeftChannel {
                channel: msg.param(0).to_string(),
                nick: source.nick,
            }),
            "QUIT" => Handled::event(IrcEvent::UserQuit {
                nick: source.nick,
                reason: msg.last_param().to_string(),
            }),
            "KICK" => Handled::event(IrcEvent::UserKicked {
                channel: msg.param(0).to_string(),
                nick: msg.param(1).to_string(),
            }),
            "MODE" => {
                let target = msg.param(0);
                if !target.starts_with('#') {
                    return Handled::default();
                }
                Handled::event(IrcEvent::ChannelModeChanged {
                    channel: target.to_string(),
                    setter: source.nick,
                    modes: msg.param(1).to_string(),
                    arguments: msg.params.iter().skip(2).cloned().collect(),
                })
            }
            "TOPIC" => Handled::event(IrcEvent::Topic {
                channel: msg.param(0).to_string(),
                topic: msg.last_param().to_string(),
            }),
            "NICK" => {
                let new = msg.last_param().to_string();
                if source.nick == self.nick {
                    self.nick = new.clone();
                }
                Handled::event(IrcEvent::NickChanged {
                    old: source.nick,
                    new,
                })
            }
            "PING" => {
                let reply = match msg.params.last() {
                    Some(token) => format!("PONG :{token}"),
                    None => "PONG".to_string(),
                };
                Handled {
                    reply: Some(reply),
                    ..Default::default()
                }
            }
            "PONG" => {
                tracing::trace!("PONG {:?}", msg.params);
                Handled::default()
            }
            "ERROR" => Handled {
                events: vec![IrcEvent::ServerError {
                    message: msg.last_param().to_string(),
                }],
                fatal: true,
                ..Default::default()
            },
            other => {
                tracing::debug!("Unhandled command {other}: {:?}", msg.params);
                Handled::default()
            }
        }
    }
}

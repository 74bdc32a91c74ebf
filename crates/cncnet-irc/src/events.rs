//! Events emitted by [`IrcConnection`](crate::IrcConnection).
//!
//! Every inbound line and lifecycle change is converted to one of these and
//! posted on the connection's event channel; the consumer drains the channel
//! on its own update loop.

/// A connection lifecycle change or decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    // --- Lifecycle ---
    /// A connection attempt to this server has started.
    AttemptedServerChanged {
        /// Display name of the server.
        display_name: String,
    },
    /// Every candidate server and port failed.
    ConnectAttemptFailed,
    /// The TCP connection is up and registration was sent.
    Connected {
        /// Display name of the server.
        server: String,
    },
    /// Numeric 001: registration accepted.
    Welcome {
        /// Welcome text sent by the server.
        message: String,
    },
    /// The connection dropped without the user asking for it.
    ConnectionLost {
        /// Human-readable cause.
        reason: String,
    },
    /// A reconnect attempt is starting after a lost connection.
    ReconnectAttempt {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The reconnect budget is used up; no further attempts are made.
    ReconnectBudgetExhausted,
    /// The user disconnected; no reconnect follows.
    Disconnected,

    // --- Server information ---
    /// Informational text from the server (MOTD-style numerics, server notices).
    ServerMessage {
        /// Text to display.
        message: String,
    },
    /// `ERROR` line; the server is closing the link.
    ServerError {
        /// Text sent by the server.
        message: String,
    },
    /// Numeric 301: target is away.
    Away {
        /// Away user.
        nick: String,
        /// Away message.
        message: String,
    },
    /// Numeric 311: WHOIS user line.
    WhoisUser {
        /// Nickname.
        nick: String,
        /// Ident.
        ident: String,
        /// Host.
        host: String,
        /// Real name.
        real_name: String,
    },
    /// Numeric 352: one WHO reply line.
    WhoReply {
        /// Channel in the reply, or `*`.
        channel: String,
        /// Ident.
        ident: String,
        /// Host (address) of the user.
        host: String,
        /// Nickname.
        nick: String,
        /// Trailing text (hop count and real name).
        extra: String,
    },
    /// Numerics 353 + 366: a complete channel user list.
    UserList {
        /// Channel name.
        channel: String,
        /// Nicknames with mode prefixes stripped.
        users: Vec<String>,
    },

    // --- Errors (numeric replies) ---
    /// 401: no such nick.
    NoSuchNick {
        /// Target nickname.
        nick: String,
    },
    /// 403: no such channel.
    NoSuchChannel {
        /// Target channel.
        channel: String,
    },
    /// 404: cannot send to channel.
    CannotSendToChannel {
        /// Target channel.
        channel: String,
    },
    /// 432: erroneous nickname.
    ErroneousNickname {
        /// Rejected nickname.
        nick: String,
    },
    /// 433: nickname already in use.
    NameAlreadyInUse {
        /// Rejected nickname.
        nick: String,
    },
    /// 439: target change too fast; the server is rate limiting us.
    TargetChangeTooFast {
        /// Target the message was for.
        target: String,
        /// Server explanation.
        message: String,
    },
    /// 451: not registered.
    NotRegistered,
    /// 461: command needs more parameters.
    NeedMoreParams {
        /// Offending command.
        command: String,
    },
    /// 465: banned from the server.
    BannedFromServer {
        /// Server explanation.
        message: String,
    },
    /// 471: channel is full.
    ChannelFull {
        /// Channel name.
        channel: String,
    },
    /// 473: channel is invite-only.
    ChannelInviteOnly {
        /// Channel name.
        channel: String,
    },
    /// 474: banned from the channel.
    BannedFromChannel {
        /// Channel name.
        channel: String,
    },
    /// 475: wrong channel key.
    IncorrectChannelPassword {
        /// Channel name.
        channel: String,
    },

    // --- Keyword commands ---
    /// `JOIN`: a user (possibly us) joined a channel.
    UserJoinedChannel {
        /// Channel name.
        channel: String,
        /// Nickname.
        nick: String,
        /// Ident.
        ident: String,
        /// Host.
        host: String,
    },
    /// `PART`: a user left a channel.
    UserLeftChannel {
        /// Channel name.
        channel: String,
        /// Nickname.
        nick: String,
    },
    /// `QUIT`: a user left the network.
    UserQuit {
        /// Nickname.
        nick: String,
        /// Quit message.
        reason: String,
    },
    /// `KICK`: a user was removed from a channel.
    UserKicked {
        /// Channel name.
        channel: String,
        /// Kicked nickname.
        nick: String,
    },
    /// `PRIVMSG` to a channel.
    ChatMessage {
        /// Channel name.
        channel: String,
        /// Sender nickname.
        nick: String,
        /// Sender ident.
        ident: String,
        /// Message text.
        message: String,
    },
    /// `PRIVMSG` addressed to us directly.
    PrivateMessage {
        /// Sender nickname.
        nick: String,
        /// Message text.
        message: String,
    },
    /// `NOTICE` without CTCP quoting.
    Notice {
        /// Sender nickname or server.
        sender: String,
        /// Channel or nickname the notice was sent to.
        target: String,
        /// Notice text.
        message: String,
    },
    /// CTCP-quoted `NOTICE`/`PRIVMSG` payload.
    Ctcp {
        /// Sender nickname.
        sender: String,
        /// Channel or nickname the message was sent to.
        target: String,
        /// Payload with the delimiters removed.
        payload: String,
    },
    /// `MODE` on a channel.
    ChannelModeChanged {
        /// Channel name.
        channel: String,
        /// Nickname that set the modes.
        setter: String,
        /// Mode string, e.g. `+o`.
        modes: String,
        /// Mode arguments.
        arguments: Vec<String>,
    },
    /// `TOPIC` change or 332 reply.
    Topic {
        /// Channel name.
        channel: String,
        /// Topic text.
        topic: String,
    },
    /// `NICK`: a user changed nickname.
    NickChanged {
        /// Previous nickname.
        old: String,
        /// New nickname.
        new: String,
    },
}

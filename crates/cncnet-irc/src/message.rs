//! IRC wire grammar.
//!
//! ```text
//! [':' prefix ' '] command { ' ' middle } [' :' trailing]
//! ```
//!
//! The trailing parameter, when present, is appended as the last entry of
//! [`IrcMessage::params`] so callers index parameters uniformly.

/// Errors produced while parsing one line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrcParseError {
    /// The line was empty after trimming.
    #[error("empty line")]
    Empty,
    /// A prefix was present but no command followed it.
    #[error("missing command in {0:?}")]
    MissingCommand(String),
}

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// Source of the message without the leading colon.
    pub prefix: Option<String>,
    /// Keyword (`PRIVMSG`) or three-digit numeric (`001`).
    pub command: String,
    /// Middle parameters followed by the trailing parameter.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single line. Trailing CR/LF are ignored.
    pub fn parse(line: &str) -> Result<Self, IrcParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(IrcParseError::Empty);
        }

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(after_colon) => match after_colon.split_once(' ') {
                Some((prefix, rest)) => (Some(prefix.to_string()), rest),
                None => return Err(IrcParseError::MissingCommand(line.to_string())),
            },
            None => (None, line),
        };

        let (middle, trailing) = match rest.split_once(" :") {
            Some((middle, trailing)) => (middle, Some(trailing)),
            None => (rest, None),
        };

        let mut tokens = middle.split(' ').filter(|t| !t.is_empty());
        let command = tokens
            .next()
            .ok_or_else(|| IrcParseError::MissingCommand(line.to_string()))?
            .to_string();

        let mut params: Vec<String> = tokens.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Self {
            prefix,
            command,
            params,
        })
    }

    /// The numeric code, if the command is a three-digit reply.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Parameter at `index`, or an empty string.
    pub fn param(&self, index: usize) -> &str {
        self.params.get(index).map_or("", String::as_str)
    }

    /// The last parameter (usually the human-readable text), or "".
    pub fn last_param(&self) -> &str {
        self.params.last().map_or("", String::as_str)
    }

    /// The parsed `nick!ident@host` prefix.
    pub fn source(&self) -> Prefix {
        Prefix::parse(self.prefix.as_deref().unwrap_or(""))
    }
}

/// A message source split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prefix {
    /// Nickname or server name.
    pub nick: String,
    /// Ident (user) part, if present.
    pub ident: Option<String>,
    /// Host part, if present.
    pub host: Option<String>,
}

impl Prefix {
    /// Split `nick!ident@host`; missing parts are `None`.
    pub fn parse(prefix: &str) -> Self {
        let (rest, host) = match prefix.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_string())),
            None => (prefix, None),
        };
        let (nick, ident) = match rest.split_once('!') {
            Some((nick, ident)) => (nick.to_string(), Some(ident.to_string())),
            None => (rest.to_string(), None),
        };
        Self { nick, ident, host }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privmsg_with_prefix_and_trailing() {
        let msg = IrcMessage::parse(":nick!ident@host PRIVMSG #chan :hello world").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("nick!ident@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan", "hello world"]);
    }

    #[test]
    fn test_numeric_welcome() {
        let msg = IrcMessage::parse(":server 001 mynick :Welcome").unwrap();
        assert_eq!(msg.numeric(), Some(1));
        assert_eq!(msg.params, vec!["mynick", "Welcome"]);
    }

    #[test]
    fn test_no_prefix_ping() {
        let msg = IrcMessage::parse("PING :irc.example.net\r\n").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["irc.example.net"]);
    }

    #[test]
    fn test_only_first_colon_separator_starts_trailing() {
        let msg = IrcMessage::parse(":a PRIVMSG #c :time is 12 :30").unwrap();
        assert_eq!(msg.params, vec!["#c", "time is 12 :30"]);
    }

    #[test]
    fn test_middle_params_without_trailing() {
        let msg = IrcMessage::parse(":op!i@h MODE #chan +o  someone").unwrap();
        assert_eq!(msg.params, vec!["#chan", "+o", "someone"]);
        assert_eq!(msg.numeric(), None);
    }

    #[test]
    fn test_empty_trailing_is_kept() {
        let msg = IrcMessage::parse(":a TOPIC #c :").unwrap();
        assert_eq!(msg.params, vec!["#c", ""]);
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(IrcMessage::parse(""), Err(IrcParseError::Empty));
        assert_eq!(IrcMessage::parse("   \r\n"), Err(IrcParseError::Empty));
        assert!(matches!(
            IrcMessage::parse(":lonelyprefix"),
            Err(IrcParseError::MissingCommand(_))
        ));
        assert!(matches!(
            IrcMessage::parse(":prefix  "),
            Err(IrcParseError::MissingCommand(_))
        ));
    }

    #[test]
    fn test_prefix_parts() {
        let p = Prefix::parse("nick!ident@host.example");
        assert_eq!(p.nick, "nick");
        assert_eq!(p.ident.as_deref(), Some("ident"));
        assert_eq!(p.host.as_deref(), Some("host.example"));

        let server = Prefix::parse("irc.example.net");
        assert_eq!(server.nick, "irc.example.net");
        assert_eq!(server.ident, None);
        assert_eq!(server.host, None);
    }

    #[test]
    fn test_param_accessors_default_to_empty() {
        let msg = IrcMessage::parse("QUIT").unwrap();
        assert_eq!(msg.param(0), "");
        assert_eq!(msg.last_param(), "");
    }
}

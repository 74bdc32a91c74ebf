//! Lines typed into the lobby console.

/// A console line, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/load` or `/ready`: the load button.
    Load,
    /// `/save N`: pick a saved game (host).
    SelectSave(usize),
    /// `/saves`: list saved games.
    ListSaves,
    /// `/players`: show the lobby.
    Players,
    /// `/tunnel address:port` (CnCNet host).
    Tunnel(String),
    /// `/kick name` (host).
    Kick(String),
    /// `/quit`.
    Quit,
    /// Anything that is not a command.
    Chat(String),
    /// A command that could not be understood, with a usage hint.
    Invalid(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Chat(line.to_string()));
        };
        let (word, arg) = match rest.split_once(char::is_whitespace) {
            Some((word, arg)) => (word, arg.trim()),
            None => (rest, ""),
        };
        let command = match word.to_ascii_lowercase().as_str() {
            "load" | "ready" => Self::Load,
            "saves" => Self::ListSaves,
            "players" => Self::Players,
            "quit" | "leave" => Self::Quit,
            "save" => match arg.parse() {
                Ok(index) => Self::SelectSave(index),
                Err(_) => Self::Invalid("usage: /save <index>"),
            },
            "tunnel" if !arg.is_empty() => Self::Tunnel(arg.to_string()),
            "tunnel" => Self::Invalid("usage: /tunnel <address:port>"),
            "kick" if !arg.is_empty() => Self::Kick(arg.to_string()),
            "kick" => Self::Invalid("usage: /kick <name>"),
            _ => Self::Invalid("commands: /load /ready /save N /saves /players /tunnel addr:port /kick name /quit"),
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(Command::parse("  gl hf "), Some(Command::Chat("gl hf".to_string())));
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn test_commands() {
        assert_eq!(Command::parse("/ready"), Some(Command::Load));
        assert_eq!(Command::parse("/LOAD"), Some(Command::Load));
        assert_eq!(Command::parse("/save 2"), Some(Command::SelectSave(2)));
        assert_eq!(
            Command::parse("/tunnel 1.2.3.4:50000"),
            Some(Command::Tunnel("1.2.3.4:50000".to_string()))
        );
        assert_eq!(Command::parse("/quit"), Some(Command::Quit));
        assert_eq!(Command::parse("/kick  Bob"), Some(Command::Kick("Bob".to_string())));
    }

    #[test]
    fn test_bad_arguments() {
        assert!(matches!(Command::parse("/save two"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/tunnel"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/kick"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/dance"), Some(Command::Invalid(_))));
    }
}

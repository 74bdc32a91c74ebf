//! Player records of a saved-game loading lobby.

/// A peer present in the loading lobby.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerInfo {
    /// Nickname, unique in the lobby.
    pub name: String,
    /// The player asked the host to start loading.
    pub ready: bool,
    /// The player's file hash matched the host's.
    pub verified: bool,
    /// In-game port assigned by the host at start.
    pub port: u16,
    /// Address other players reach this player on.
    pub ip_address: String,
    /// Position in the saved-game roster.
    pub index: usize,
    /// Last reported tunnel round trip in milliseconds, if any.
    pub tunnel_ping: Option<i32>,
}

impl PlayerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A player recorded in the saved game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGamePlayer {
    pub name: String,
    /// Color the player had in the saved game; chat lines use it.
    pub color_index: i32,
}

/// Whether every saved-game player is present and ready.
pub fn all_ready(players: &[PlayerInfo], roster: &[SavedGamePlayer]) -> bool {
    players.len() == roster.len() && players.iter().all(|p| p.ready)
}

/// Whether every saved-game player is present.
pub fn all_present(players: &[PlayerInfo], roster: &[SavedGamePlayer]) -> bool {
    players.len() == roster.len()
}

/// Position of `name` in the saved-game roster.
pub fn roster_index(roster: &[SavedGamePlayer], name: &str) -> Option<usize> {
    roster.iter().position(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<SavedGamePlayer> {
        ["Alice", "Bob"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| SavedGamePlayer {
                name: name.into(),
                color_index: i as i32,
            })
            .collect()
    }

    fn player(name: &str, ready: bool) -> PlayerInfo {
        PlayerInfo {
            ready,
            ..PlayerInfo::new(name)
        }
    }

    #[test]
    fn test_all_ready_needs_everyone_present() {
        assert!(!all_ready(&[player("Alice", true)], &roster()));
        assert!(!all_ready(&[player("Alice", true), player("Bob", false)], &roster()));
        assert!(all_ready(&[player("Alice", true), player("Bob", true)], &roster()));
    }

    #[test]
    fn test_roster_index() {
        assert_eq!(roster_index(&roster(), "Bob"), Some(1));
        assert_eq!(roster_index(&roster(), "bob"), None);
    }
}

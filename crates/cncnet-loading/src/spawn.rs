//! Spawn file written right before the game starts.
//!
//! The saved-game descriptor is the starting point. `[Settings]` gets the
//! save to load and the local port; the `OtherN` sections are rewritten
//! from the local player's point of view, in roster order.

use std::path::Path;

use crate::ini::{IniDocument, IniError};
use crate::player::{PlayerInfo, SavedGamePlayer};
use crate::saved_game::MAX_OTHER_PLAYERS;

/// Build the spawn document for `local_name`.
///
/// Roster entries without a matching player record are skipped.
pub fn build_spawn(
    descriptor: &IniDocument,
    save_name: &str,
    local_name: &str,
    roster: &[SavedGamePlayer],
    players: &[PlayerInfo],
) -> IniDocument {
    let mut spawn = descriptor.clone();
    for n in 1..=MAX_OTHER_PLAYERS {
        spawn.remove_section(&format!("Other{n}"));
    }

    spawn.set("Settings", "SaveGameName", save_name);
    spawn.set("Settings", "LoadSaveGame", "true");
    spawn.set("Settings", "Name", local_name);

    let mut other = 0;
    for entry in roster {
        let Some(player) = players.iter().find(|p| p.name == entry.name) else {
            continue;
        };
        if player.name == local_name {
            spawn.set("Settings", "Port", player.port);
            spawn.set("Settings", "Color", entry.color_index);
            continue;
        }
        other += 1;
        let section = format!("Other{other}");
        spawn.set(&section, "Name", &player.name);
        spawn.set(&section, "Color", entry.color_index);
        spawn.set(&section, "Ip", &player.ip_address);
        spawn.set(&section, "Port", player.port);
    }
    spawn
}

/// Replace the spawn file at `path` with `spawn`.
pub fn write_spawn(path: &Path, spawn: &IniDocument) -> Result<(), IniError> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed stale spawn file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(IniError::Write {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    spawn.save(path)
}

//! Saved-game roster and save file listing.
//!
//! The saved-game descriptor (`spawnSG.ini`) is the spawn file of the
//! original match. The local player of that match is in `[Settings]`, the
//! others in `[Other1]`..`[Other7]`:
//!
//! ```text
//! [Settings]
//! Name=Alice
//! Color=0
//! GameID=5521
//! UIMapName=Lake Blitz
//! UIGameMode=Battle
//!
//! [Other1]
//! Name=Bob
//! Color=3
//! ```

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::ini::{IniDocument, IniError};
use crate::player::SavedGamePlayer;

/// Highest `OtherN` section read from the descriptor.
pub const MAX_OTHER_PLAYERS: usize = 7;

/// Saved game file extension, matched case-insensitively.
pub const SAVE_EXTENSION: &str = "sav";

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Descriptor(#[from] IniError),
    #[error("saved-game descriptor has no GameID")]
    MissingGameId,
    #[error("saved-game descriptor lists no players")]
    EmptyRoster,
    #[error("failed to list saved games in {path}: {source}")]
    ListDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Players and identity of the match being resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGameRoster {
    pub game_id: String,
    pub players: Vec<SavedGamePlayer>,
    pub map: String,
    pub mode: String,
}

impl SavedGameRoster {
    pub fn from_descriptor(doc: &IniDocument) -> Result<Self, SaveError> {
        let game_id = doc
            .get("Settings", "GameID")
            .filter(|id| !id.is_empty())
            .ok_or(SaveError::MissingGameId)?
            .to_string();

        let mut players = Vec::new();
        let sections = std::iter::once("Settings".to_string())
            .chain((1..=MAX_OTHER_PLAYERS).map(|n| format!("Other{n}")));
        for section in sections {
            let Some(name) = doc.get(&section, "Name").filter(|n| !n.is_empty()) else {
                continue;
            };
            players.push(SavedGamePlayer {
                name: name.to_string(),
                color_index: doc.get_int(&section, "Color").unwrap_or(0),
            });
        }
        if players.is_empty() {
            return Err(SaveError::EmptyRoster);
        }

        Ok(Self {
            game_id,
            players,
            map: doc.get("Settings", "UIMapName").unwrap_or_default().to_string(),
            mode: doc.get("Settings", "UIGameMode").unwrap_or_default().to_string(),
        })
    }
}

/// A save file that can be selected for loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGameInfo {
    /// File name written to `SaveGameName`.
    pub file_name: String,
    pub modified: Option<SystemTime>,
}

/// Source of the roster and the selectable saves.
pub trait SaveStorage: Send {
    /// The saved-game descriptor, copied into the spawn file at launch.
    fn load_descriptor(&self) -> Result<IniDocument, SaveError>;

    fn load_roster(&self) -> Result<SavedGameRoster, SaveError> {
        SavedGameRoster::from_descriptor(&self.load_descriptor()?)
    }

    /// Saves newest first; the order defines the save index.
    fn list_saved_games(&self) -> Result<Vec<SavedGameInfo>, SaveError>;
}

/// Reads saves from the game's saved game directory.
#[derive(Debug, Clone)]
pub struct DirectorySaveStorage {
    descriptor: PathBuf,
    directory: PathBuf,
}

impl DirectorySaveStorage {
    pub fn new(descriptor: impl Into<PathBuf>, directory: impl Into<PathBuf>) -> Self {
        Self {
            descriptor: descriptor.into(),
            directory: directory.into(),
        }
    }

    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }
}

impl SaveStorage for DirectorySaveStorage {
    fn load_descriptor(&self) -> Result<IniDocument, SaveError> {
        Ok(IniDocument::load(&self.descriptor)?)
    }

    fn list_saved_games(&self) -> Result<Vec<SavedGameInfo>, SaveError> {
        let list_err = |source| SaveError::ListDirectory {
            path: self.directory.clone(),
            source,
        };
        let mut saves = Vec::new();
        for entry in std::fs::read_dir(&self.directory).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let path = entry.path();
            let is_save = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(SAVE_EXTENSION));
            if !is_save || !path.is_file() {
                continue;
            }
            saves.push(SavedGameInfo {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                modified: entry.metadata().and_then(|m| m.modified()).ok(),
            });
        }
        saves.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.file_name.cmp(&b.file_name)));
        Ok(saves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "[Settings]\nName=Alice\nColor=0\nGameID=5521\nUIMapName=Lake Blitz\n\n[Other1]\nName=Bob\nColor=3\n\n[Other3]\nName=Carol\n";

    #[test]
    fn test_roster_from_descriptor() {
        let doc = IniDocument::parse(DESCRIPTOR).unwrap();
        let roster = SavedGameRoster::from_descriptor(&doc).unwrap();
        assert_eq!(roster.game_id, "5521");
        assert_eq!(roster.map, "Lake Blitz");
        assert_eq!(roster.mode, "");
        let names: Vec<_> = roster.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
        assert_eq!(roster.players[1].color_index, 3);
    }

    #[test]
    fn test_roster_requires_game_id() {
        let doc = IniDocument::parse("[Settings]\nName=Alice\n").unwrap();
        assert!(matches!(
            SavedGameRoster::from_descriptor(&doc),
            Err(SaveError::MissingGameId)
        ));
    }

    #[test]
    fn test_directory_storage_lists_only_saves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("spawnSG.ini"), DESCRIPTOR).unwrap();
        std::fs::write(dir.path().join("SAVE0001.SAV"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let storage = DirectorySaveStorage::new(dir.path().join("spawnSG.ini"), dir.path());
        let saves = storage.list_saved_games().unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].file_name, "SAVE0001.SAV");
        assert_eq!(storage.load_roster().unwrap().players.len(), 3);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectorySaveStorage::new(dir.path().join("spawnSG.ini"), dir.path().join("nope"));
        assert!(matches!(
            storage.list_saved_games(),
            Err(SaveError::ListDirectory { .. })
        ));
        assert!(matches!(storage.load_roster(), Err(SaveError::Descriptor(_))));
    }
}

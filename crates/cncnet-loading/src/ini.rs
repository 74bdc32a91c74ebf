//! Minimal ordered INI document used for the saved-game descriptor and the
//! spawn file.
//!
//! Sections and keys are matched case-insensitively and keep their original
//! spelling and order when written back. Comment lines (`;` or `#`) and lines
//! outside any section are dropped.

use std::fmt;
use std::path::{Path, PathBuf};

/// Errors reading or writing an INI file.
#[derive(Debug, thiserror::Error)]
pub enum IniError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line {line}: expected `key=value` or `[section]`, got {text:?}")]
    Syntax { line: usize, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// An INI file held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<Section>,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text. A line that is neither a section header, a comment
    /// nor contains `=` is a syntax error.
    pub fn parse(text: &str) -> Result<Self, IniError> {
        let mut doc = Self::new();
        let mut current: Option<usize> = None;

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(doc.section_index_or_insert(name.trim()));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(IniError::Syntax {
                    line: number + 1,
                    text: raw.to_string(),
                });
            };
            match current {
                Some(index) => doc.sections[index].set(key.trim(), value.trim()),
                None => tracing::trace!("Ignoring INI entry outside a section: {line:?}"),
            }
        }
        Ok(doc)
    }

    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self, IniError> {
        let text = std::fs::read_to_string(path).map_err(|source| IniError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Write the document to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), IniError> {
        std::fs::write(path, self.to_string()).map_err(|source| IniError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)
    }

    pub fn get_int(&self, section: &str, key: &str) -> Option<i32> {
        self.get(section, key)?.parse().ok()
    }

    /// Set `key` in `section`, creating both as needed.
    pub fn set(&mut self, section: &str, key: &str, value: impl fmt::Display) {
        let index = self.section_index_or_insert(section);
        self.sections[index].set(key, &value.to_string());
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.section(section).is_some()
    }

    pub fn remove_section(&mut self, section: &str) {
        self.sections.retain(|s| !s.name.eq_ignore_ascii_case(section));
    }

    /// Section names in file order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(index) = self
            .sections
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
        {
            return index;
        }
        self.sections.push(Section {
            name: name.to_string(),
            entries: Vec::new(),
        });
        self.sections.len() - 1
    }
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }
}

impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                writeln!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup_is_case_insensitive() {
        let doc = IniDocument::parse("; saved\n[Settings]\nName=Alice\nGameID = 5521\n\n[other1]\nName=Bob\n")
            .unwrap();
        assert_eq!(doc.get("settings", "name"), Some("Alice"));
        assert_eq!(doc.get_int("SETTINGS", "GameID"), Some(5521));
        assert_eq!(doc.get("Other1", "Name"), Some("Bob"));
        assert_eq!(doc.get("Other2", "Name"), None);
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = IniDocument::parse("[Settings]\nName=Alice\ngarbage\n").unwrap_err();
        assert!(matches!(err, IniError::Syntax { line: 3, .. }));
    }

    #[test]
    fn test_set_overwrites_and_preserves_order() {
        let mut doc = IniDocument::parse("[Settings]\nName=Alice\nPort=1\n").unwrap();
        doc.set("settings", "PORT", 1234);
        doc.set("Other1", "Name", "Bob");
        assert_eq!(doc.to_string(), "[Settings]\nName=Alice\nPort=1234\n\n[Other1]\nName=Bob\n");
    }

    #[test]
    fn test_remove_section() {
        let mut doc = IniDocument::parse("[A]\nx=1\n[B]\ny=2\n").unwrap();
        doc.remove_section("a");
        assert_eq!(doc.section_names().collect::<Vec<_>>(), vec!["B"]);
        assert!(!doc.has_section("A"));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spawn.ini");
        let mut doc = IniDocument::new();
        doc.set("Settings", "LoadSaveGame", true);
        doc.save(&path).unwrap();
        let loaded = IniDocument::load(&path).unwrap();
        assert_eq!(loaded.get("Settings", "LoadSaveGame"), Some("true"));
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = IniDocument::load(&dir.path().join("missing.ini")).unwrap_err();
        assert!(matches!(err, IniError::Read { .. }));
    }
}

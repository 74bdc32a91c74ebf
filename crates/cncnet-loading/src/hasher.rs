//! Integrity hash over the game files that must match between players.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Computes the hash players exchange in `FHSH` / `FILE_HASH`.
pub trait FileHasher: Send {
    /// Hash `files` (relative to `base`) in the given order.
    fn hash_files(&self, base: &Path, files: &[PathBuf]) -> std::io::Result<String>;
}

/// SHA-256 over the concatenated file contents, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256FileHasher;

impl FileHasher for Sha256FileHasher {
    fn hash_files(&self, base: &Path, files: &[PathBuf]) -> std::io::Result<String> {
        let mut hasher = Sha256::new();
        for file in files {
            let bytes = std::fs::read(base.join(file))?;
            hasher.update(&bytes);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

//! Persisted set of idempotency keys for backlog lines.
//!
//! Keys only ever grow: once a line's key is stored it is never removed, so a
//! line is dispatched at most once across restarts. Every new key is flushed
//! immediately through [`atomic_write`].

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::fsio::atomic_write;

/// Derives the idempotency key of a backlog line: SHA-256 of the trimmed,
/// lowercased text, hex encoded.
pub fn idempotency_key(line: &str) -> String {
    let normalized = line.trim().to_lowercase();
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Reads the key set from `path`. A missing or unparsable file yields an
/// empty set and a warning.
pub fn load(path: &Path) -> HashSet<String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return HashSet::new(),
        Err(e) => {
            warn!(path = %path.display(), "dedupe cache unreadable: {e}");
            return HashSet::new();
        }
    };
    match serde_json::from_str::<Vec<String>>(&contents) {
        Ok(keys) => keys.into_iter().collect(),
        Err(e) => {
            warn!(path = %path.display(), "dedupe cache unparsable, starting empty: {e}");
            HashSet::new()
        }
    }
}

/// Writes the key set as a sorted JSON array.
pub fn save(path: &Path, keys: &HashSet<String>) -> io::Result<()> {
    let ordered: BTreeSet<&String> = keys.iter().collect();
    let json = serde_json::to_string_pretty(&ordered)?;
    atomic_write(path, &json)
}

/// In-memory key set backed by a JSON file.
pub struct DedupeCache {
    path: PathBuf,
    keys: Mutex<HashSet<String>>,
}

impl DedupeCache {
    pub fn open(path: PathBuf) -> Self {
        let keys = load(&path);
        debug!(path = %path.display(), keys = keys.len(), "dedupe cache loaded");
        Self {
            path,
            keys: Mutex::new(keys),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    /// Adds `key` and flushes. Adding a present key is a no-op.
    pub fn add(&self, key: &str) -> io::Result<()> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.to_string()) {
            return Ok(());
        }
        save(&self.path, &keys)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

//! Persisted reader positions used to resume tailing across restarts.
//!
//! Entries are keyed by persist name and record the offset together with the
//! identity (device, inode) of the file the offset belongs to.

use crate::error::{Result, SourceError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Saved position of one reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistEntry {
    pub offset: u64,
    pub dev: u64,
    pub inode: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistFile {
    #[serde(default)]
    entries: BTreeMap<String, PersistEntry>,
}

/// Store for reader positions, optionally backed by a TOML file.
#[derive(Debug, Default)]
pub struct PersistStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, PersistEntry>>,
}

impl PersistStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store; a missing file starts empty
    pub fn open(path: &Path) -> Result<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => {
                let file: PersistFile = toml::from_str(&text).map_err(|e| {
                    SourceError::persist(format!("corrupt state file {}: {e}", path.display()))
                })?;
                file.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SourceError::filesystem(
                    format!("Failed to read state file: {}", path.display()),
                    e,
                ))
            }
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<PersistEntry> {
        self.entries.lock().get(name).copied()
    }

    /// Record an entry and write the store through to its file, if any
    pub fn update(&self, name: &str, entry: PersistEntry) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.get(name) == Some(&entry) {
            return Ok(());
        }
        entries.insert(name.to_string(), entry);

        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = PersistFile {
            entries: entries.clone(),
        };
        let text = toml::to_string(&file).map_err(|e| SourceError::persist(e.to_string()))?;
        let save_error = |e: io::Error| {
            SourceError::filesystem(format!("Failed to save state: {}", path.display()), e)
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        // Write next to the target so the rename stays on one filesystem
        let mut staged = NamedTempFile::new_in(dir).map_err(save_error)?;
        staged.write_all(text.as_bytes()).map_err(save_error)?;
        staged.persist(path).map_err(|e| save_error(e.error))?;
        Ok(())
    }
}

//! Persistence of the active server between sessions.
//!
//! Only the active record is stored. The server list is always refetched.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ServerRecord;

/// Fixed storage key; the file store writes `<state_dir>/server-store.json`.
pub const STORAGE_KEY: &str = "server-store";

/// Where the registry keeps its active-server snapshot.
pub trait ActiveServerStore {
    fn load(&self) -> Result<Option<ServerRecord>, StoreError>;
    fn save(&self, active: Option<&ServerRecord>) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    active_server: Option<ServerRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    active_server: Option<&'a ServerRecord>,
}

fn encode(active: Option<&ServerRecord>) -> Result<String, StoreError> {
    serde_json::to_string_pretty(&SnapshotRef { active_server: active }).map_err(StoreError::Serialize)
}

fn decode(content: &str) -> Result<Option<ServerRecord>, StoreError> {
    let snapshot: Snapshot = serde_json::from_str(content).map_err(StoreError::Parse)?;
    Ok(snapshot.active_server)
}

/// JSON file under the state directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the fixed key inside `state_dir`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(format!("{STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ActiveServerStore for FileStore {
    fn load(&self) -> Result<Option<ServerRecord>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        decode(&content)
    }

    fn save(&self, active: Option<&ServerRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
        }
        let output = encode(active)?;
        std::fs::write(&self.path, output).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-process store. Clones share the same snapshot, so a second registry built
/// from a clone sees what the first one saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: Rc<RefCell<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw serialized snapshot, if anything was saved.
    pub fn raw(&self) -> Option<String> {
        self.snapshot.borrow().clone()
    }

    /// Overwrite the raw snapshot, e.g. to simulate a corrupt entry.
    pub fn set_raw(&self, content: impl Into<String>) {
        *self.snapshot.borrow_mut() = Some(content.into());
    }
}

impl ActiveServerStore for MemoryStore {
    fn load(&self) -> Result<Option<ServerRecord>, StoreError> {
        match self.snapshot.borrow().as_deref() {
            Some(content) => decode(content),
            None => Ok(None),
        }
    }

    fn save(&self, active: Option<&ServerRecord>) -> Result<(), StoreError> {
        let output = encode(active)?;
        *self.snapshot.borrow_mut() = Some(output);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse stored active server: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Failed to serialize active server: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to create state directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_through_json() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());

        let record = ServerRecord::new("s1", true).with_field("name", "Main");
        store.save(Some(&record)).unwrap();
        assert!(store.raw().unwrap().contains("\"activeServer\""));
        assert_eq!(store.load().unwrap(), Some(record));

        store.save(None).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn clones_share_the_snapshot() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.save(Some(&ServerRecord::new("s1", false))).unwrap();
        assert_eq!(other.load().unwrap().map(|r| r.id), Some("s1".to_string()));
    }

    #[test]
    fn mismatched_shape_is_a_parse_error() {
        let store = MemoryStore::new();
        store.set_raw(r#"{"activeServer": {"name": "no id"}}"#);
        assert!(matches!(store.load(), Err(StoreError::Parse(_))));
    }
}

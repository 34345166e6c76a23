//! Persisted send-state
//!
//! JSON map of watched file path to the content signature last delivered
//! and when. Loaded once at startup and rewritten after every successful
//! send. Rewrites go to a temporary sibling first and are renamed into
//! place, so a crash leaves either the old or the new file, never a torn
//! one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Result, UploaderError};

/// Last successful delivery of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRecord {
    /// Hex SHA-256 of the file content that was delivered
    pub signature: String,
    pub last_sent_at: DateTime<Utc>,
}

pub struct SendStateStore {
    path: PathBuf,
    entries: BTreeMap<String, SendRecord>,
}

impl SendStateStore {
    /// Load the state file; a missing file starts empty
    ///
    /// A file that exists but cannot be read or parsed is an error: starting
    /// empty would re-send everything.
    pub async fn load(path: &Path) -> Result<Self> {
        let entries = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| state_error(path, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No send-state at {}, starting fresh", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(state_error(path, e)),
        };

        debug!("Loaded {} send-state entries from {}", entries.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, file: &Path) -> Option<&SendRecord> {
        self.entries.get(&key(file))
    }

    /// True if the file was never delivered or its content changed since
    pub fn needs_send(&self, file: &Path, signature: &str) -> bool {
        self.get(file).map_or(true, |record| record.signature != signature)
    }

    /// Record a successful delivery and flush to disk
    pub async fn record(&mut self, file: &Path, signature: &str, sent_at: DateTime<Utc>) -> Result<()> {
        let previous = self.entries.insert(
            key(file),
            SendRecord {
                signature: signature.to_string(),
                last_sent_at: sent_at,
            },
        );

        if let Err(e) = self.flush().await {
            // Keep memory consistent with what is on disk
            match previous {
                Some(record) => self.entries.insert(key(file), record),
                None => self.entries.remove(&key(file)),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Write the whole map atomically (temp file + rename)
    pub async fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| state_error(&self.path, e))?;
            }
        }

        let json = serde_json::to_vec_pretty(&self.entries).map_err(|e| state_error(&self.path, e))?;
        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| state_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| state_error(&self.path, e))?;
        Ok(())
    }
}

fn key(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn state_error(path: &Path, e: impl std::fmt::Display) -> UploaderError {
    UploaderError::State {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let store = SendStateStore::load(&temp.path().join("state.json")).await.unwrap();
        assert!(store.is_empty());
        assert!(store.needs_send(Path::new("/logs/a.json"), "abc"));
    }

    #[tokio::test]
    async fn test_record_survives_reload() {
        let temp = TempDir::new().unwrap();
        let state_path = temp.path().join("nested").join("state.json");
        let file = Path::new("/logs/a.json");

        let mut store = SendStateStore::load(&state_path).await.unwrap();
        store.record(file, "abc", Utc::now()).await.unwrap();
        assert!(!store.needs_send(file, "abc"));
        assert!(store.needs_send(file, "def"));

        let reloaded = SendStateStore::load(&state_path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(file).unwrap().signature, "abc");
        assert!(!reloaded.needs_send(file, "abc"));
        assert!(!temp_path(&state_path).exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let state_path = temp.path().join("state.json");
        std::fs::write(&state_path, b"{ this is not json").unwrap();

        match SendStateStore::load(&state_path).await {
            Err(err) => assert!(err.is_fatal()),
            Ok(_) => panic!("corrupt state must not load"),
        }
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_memory_unchanged() {
        let temp = TempDir::new().unwrap();
        // A directory where the state file should be makes the rename fail
        let state_path = temp.path().join("state.json");
        let mut store = SendStateStore::load(&state_path).await.unwrap();
        std::fs::create_dir_all(state_path.join("blocker")).unwrap();

        let result = store.record(Path::new("/logs/a.json"), "abc", Utc::now()).await;
        assert!(matches!(result, Err(UploaderError::State { .. })));
        assert!(store.is_empty());
    }
}

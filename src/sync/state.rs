// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Record of what each machine has synced.
//!
//! The storage volume carries one JSON document that maps machine
//! identifiers to the outcome of their latest sync. Every workstation sharing
//! the volume reads and writes this same document, but only ever touches its
//! own key.
//!
//! The document is always rewritten whole. A write goes to a temporary
//! sibling that is then renamed over the document, and the whole
//! read-modify-write cycle holds an exclusive lock on a sibling lock file, so
//! two invocations on the same machine cannot interleave.

use mkdirp::mkdirp;
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

const STATE_FILE: &str = ".synced.json";
const LOCK_FILE: &str = ".synced.json.lock";

type Document = BTreeMap<String, Vec<SyncRecord>>;

/// Outcome of syncing one triple.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncRecord {
    /// Triple was linked.
    pub fn synced(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            synced: true,
            error: None,
        }
    }

    /// Triple was not linked.
    pub fn unsynced(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            synced: false,
            error: Some(error.into()),
        }
    }
}

/// Per-machine sync records stored in storage volume.
#[derive(Debug, Clone)]
pub struct SyncedStateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl SyncedStateStore {
    /// Construct new store for storage directory.
    ///
    /// Nothing is read or written until the first operation.
    pub fn new(storage: impl AsRef<Path>) -> Self {
        let storage = storage.as_ref();
        Self {
            path: storage.join(STATE_FILE),
            lock_path: storage.join(LOCK_FILE),
        }
    }

    /// Path to backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get records of machine.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Malformed`] if document is not valid.
    /// - Return [`StateError::Read`] if document cannot be read.
    pub fn get(&self, machine_id: &str) -> Result<Option<Vec<SyncRecord>>> {
        let mut document = self.load()?;
        Ok(document.remove(machine_id))
    }

    /// Replace records of machine wholesale.
    ///
    /// # Errors
    ///
    /// - Return [`StateError`] if document cannot be locked, read, or
    ///   written.
    #[instrument(skip(self, records), level = "debug")]
    pub fn put(&self, machine_id: &str, records: Vec<SyncRecord>) -> Result<()> {
        self.update(|document| {
            document.insert(machine_id.into(), records);
            ((), true)
        })
    }

    /// Delete records of machine.
    ///
    /// Returns the deleted records, if any.
    ///
    /// # Errors
    ///
    /// - Return [`StateError`] if document cannot be locked, read, or
    ///   written.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&self, machine_id: &str) -> Result<Option<Vec<SyncRecord>>> {
        self.update(|document| {
            let removed = document.remove(machine_id);
            let dirty = removed.is_some();
            (removed, dirty)
        })
    }

    fn update<T>(&self, mutate: impl FnOnce(&mut Document) -> (T, bool)) -> Result<T> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            mkdirp(parent).map_err(|err| StateError::Write {
                source: err,
                path: parent.into(),
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|err| StateError::Lock {
                source: err,
                path: self.lock_path.clone(),
            })?;
        let lock = Flock::lock(lock_file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            StateError::Lock {
                source: io::Error::from(errno),
                path: self.lock_path.clone(),
            }
        })?;
        debug!("locked {:?}", self.lock_path.display());

        let mut document = self.load()?;
        let (value, dirty) = mutate(&mut document);
        if dirty {
            self.save(&document)?;
        }

        // INVARIANT: Release lock only after document has been renamed into place.
        drop(lock);
        Ok(value)
    }

    fn load(&self) -> Result<Document> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(err) => {
                return Err(StateError::Read {
                    source: err,
                    path: self.path.clone(),
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Document::new());
        }

        serde_json::from_str(&content).map_err(|err| StateError::Malformed {
            source: err,
            path: self.path.clone(),
        })
    }

    fn save(&self, document: &Document) -> Result<()> {
        let content = serde_json::to_string_pretty(document).map_err(StateError::Serialize)?;
        let temporary = self.path.with_extension("json.tmp");
        fs::write(&temporary, content).map_err(|err| StateError::Write {
            source: err,
            path: temporary.clone(),
        })?;
        fs::rename(&temporary, &self.path).map_err(|err| StateError::Write {
            source: err,
            path: self.path.clone(),
        })?;
        debug!("wrote {:?}", self.path.display());

        Ok(())
    }
}

/// Sync state error types.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Document does not hold valid sync records.
    #[error("sync state {:?} is malformed", path.display())]
    Malformed {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Records could not be serialized.
    #[error("failed to serialize sync state")]
    Serialize(#[source] serde_json::Error),

    /// Document could not be read.
    #[error("failed to read sync state {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Document could not be written.
    #[error("failed to write sync state {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Lock could not be acquired.
    #[error("failed to lock sync state {:?}", path.display())]
    Lock {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn get_from_missing_document() -> anyhow::Result<()> {
        let store = SyncedStateStore::new("storage");

        assert_eq!(store.get("machine")?, None);
        assert!(!store.path().exists());

        Ok(())
    }

    #[sealed_test]
    fn put_replaces_only_own_machine() -> anyhow::Result<()> {
        let store = SyncedStateStore::new("storage");
        store.put("other", vec![SyncRecord::synced("/s/a", "/d/a")])?;
        store.put("machine", vec![SyncRecord::synced("/s/b", "/d/b")])?;

        store.put(
            "machine",
            vec![SyncRecord::unsynced("/s/c", "/d/c", "source not found")],
        )?;

        assert_eq!(
            store.get("machine")?,
            Some(vec![SyncRecord::unsynced("/s/c", "/d/c", "source not found")])
        );
        assert_eq!(
            store.get("other")?,
            Some(vec![SyncRecord::synced("/s/a", "/d/a")])
        );
        assert!(!Path::new("storage/.synced.json.tmp").exists());

        Ok(())
    }

    #[sealed_test]
    fn remove_deletes_entry() -> anyhow::Result<()> {
        let store = SyncedStateStore::new("storage");
        store.put("machine", vec![SyncRecord::synced("/s/a", "/d/a")])?;

        let removed = store.remove("machine")?;

        assert_eq!(removed, Some(vec![SyncRecord::synced("/s/a", "/d/a")]));
        assert_eq!(store.get("machine")?, None);
        assert_eq!(store.remove("machine")?, None);

        Ok(())
    }

    #[sealed_test]
    fn document_layout() -> anyhow::Result<()> {
        let store = SyncedStateStore::new("storage");
        store.put(
            "abc123",
            vec![
                SyncRecord::synced("/s/a", "/d/a"),
                SyncRecord::unsynced("/s/b", "/d/b", "boom"),
            ],
        )?;

        let expect = indoc! {r#"
            {
              "abc123": [
                {
                  "source": "/s/a",
                  "destination": "/d/a",
                  "synced": true
                },
                {
                  "source": "/s/b",
                  "destination": "/d/b",
                  "synced": false,
                  "error": "boom"
                }
              ]
            }"#};
        assert_eq!(fs::read_to_string("storage/.synced.json")?, expect);

        Ok(())
    }

    #[sealed_test]
    fn malformed_document_is_an_error() -> anyhow::Result<()> {
        fs::create_dir("storage")?;
        fs::write("storage/.synced.json", "{ not json")?;
        let store = SyncedStateStore::new("storage");

        assert!(matches!(
            store.get("machine"),
            Err(StateError::Malformed { .. })
        ));
        assert!(matches!(
            store.put("machine", Vec::new()),
            Err(StateError::Malformed { .. })
        ));
        assert_eq!(fs::read_to_string("storage/.synced.json")?, "{ not json");

        Ok(())
    }
}

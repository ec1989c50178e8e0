// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-machine backup snapshots.
//!
//! Each machine owns at most one snapshot directory inside the storage
//! volume. Destinations are mirrored under it at their absolute path with the
//! root stripped. A manifest next to the mirrored tree records what the
//! snapshot holds, so it can be restored without consulting the
//! configuration.

use crate::sync::triple::{Kind, Triple};

use mkdirp::mkdirp;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument};

const VAULT_DIR: &str = ".backup";
const MANIFEST_FILE: &str = ".manifest.json";

/// One destination held by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SnapshotEntry {
    pub kind: Kind,
    pub destination: PathBuf,

    /// Location of copy, relative to snapshot directory.
    pub snapshot: PathBuf,
}

/// Backup snapshots stored in storage volume.
#[derive(Debug, Clone)]
pub struct BackupVault {
    root: PathBuf,
}

impl BackupVault {
    /// Construct new vault for storage directory.
    pub fn new(storage: impl AsRef<Path>) -> Self {
        Self {
            root: storage.as_ref().join(VAULT_DIR),
        }
    }

    /// Snapshot of machine exists.
    pub fn exists(&self, machine_id: &str) -> bool {
        self.snapshot_path(machine_id).is_dir()
    }

    /// Snapshot directory of machine.
    pub fn snapshot_path(&self, machine_id: &str) -> PathBuf {
        self.root.join(machine_id)
    }

    /// Path inside snapshot that mirrors destination.
    pub fn mirror(&self, machine_id: &str, destination: impl AsRef<Path>) -> PathBuf {
        self.snapshot_path(machine_id)
            .join(mirrored(destination.as_ref()))
    }

    /// Discard snapshot of machine, leaving an empty one behind.
    ///
    /// # Errors
    ///
    /// - Return [`VaultError::Io`] if old snapshot cannot be deleted, or new
    ///   one cannot be created.
    #[instrument(skip(self), level = "debug")]
    pub fn reset(&self, machine_id: &str) -> Result<PathBuf> {
        let snapshot = self.snapshot_path(machine_id);
        if snapshot.exists() {
            debug!("discard old snapshot {:?}", snapshot.display());
            fs::remove_dir_all(&snapshot).map_err(|err| VaultError::Io {
                source: err,
                path: snapshot.clone(),
            })?;
        }

        mkdirp(&snapshot).map_err(|err| VaultError::Io {
            source: err,
            path: snapshot.clone(),
        })?;

        Ok(snapshot)
    }

    /// Record what snapshot of machine holds.
    ///
    /// # Errors
    ///
    /// - Return [`VaultError`] if manifest cannot be serialized or written.
    pub fn write_manifest(&self, machine_id: &str, entries: &[SnapshotEntry]) -> Result<()> {
        let path = self.snapshot_path(machine_id).join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(entries).map_err(VaultError::Serialize)?;
        fs::write(&path, content).map_err(|err| VaultError::Io { source: err, path })
    }

    /// Read what snapshot of machine holds.
    ///
    /// Returns `None` if the snapshot has no manifest.
    ///
    /// # Errors
    ///
    /// - Return [`VaultError::Malformed`] if manifest is not valid.
    /// - Return [`VaultError::Io`] if manifest cannot be read.
    pub fn read_manifest(&self, machine_id: &str) -> Result<Option<Vec<SnapshotEntry>>> {
        let path = self.snapshot_path(machine_id).join(MANIFEST_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(VaultError::Io { source: err, path }),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| VaultError::Malformed { source: err, path })
    }

    /// Triples that copy snapshot of machine back to workstation.
    ///
    /// Follows the manifest when present. Otherwise every given destination
    /// whose mirror exists in the snapshot is restored.
    ///
    /// # Errors
    ///
    /// - Return [`VaultError`] if manifest cannot be read.
    pub fn restorable<'a>(
        &self,
        machine_id: &str,
        destinations: impl IntoIterator<Item = &'a Triple>,
    ) -> Result<Vec<Triple>> {
        let snapshot = self.snapshot_path(machine_id);
        if let Some(entries) = self.read_manifest(machine_id)? {
            return Ok(entries
                .into_iter()
                .map(|entry| {
                    Triple::new(entry.kind, snapshot.join(entry.snapshot), entry.destination)
                })
                .collect());
        }

        debug!("snapshot {:?} has no manifest", snapshot.display());
        Ok(destinations
            .into_iter()
            .map(|triple| {
                let mirror = self.mirror(machine_id, &triple.destination);
                Triple::new(triple.kind, mirror, &triple.destination)
            })
            .filter(|triple| triple.source.symlink_metadata().is_ok())
            .collect())
    }
}

/// Relative form of path used inside snapshot.
fn mirrored(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Backup vault error types.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Manifest does not hold valid snapshot entries.
    #[error("backup manifest {:?} is malformed", path.display())]
    Malformed {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Manifest could not be serialized.
    #[error("failed to serialize backup manifest")]
    Serialize(#[source] serde_json::Error),

    /// Snapshot could not be accessed.
    #[error("failed to access backup {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = VaultError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn mirror_strips_root() {
        let vault = BackupVault::new("/mnt/shared/mync");

        assert_eq!(
            vault.mirror("abc", "/home/alice/.bashrc"),
            PathBuf::from("/mnt/shared/mync/.backup/abc/home/alice/.bashrc")
        );
    }

    #[sealed_test]
    fn reset_replaces_snapshot() -> anyhow::Result<()> {
        let vault = BackupVault::new("storage");
        assert!(!vault.exists("abc"));

        let snapshot = vault.reset("abc")?;
        fs::write(snapshot.join("stale"), "old")?;
        vault.reset("abc")?;

        assert!(vault.exists("abc"));
        assert!(!snapshot.join("stale").exists());

        Ok(())
    }

    #[sealed_test]
    fn manifest_drives_restorable_triples() -> anyhow::Result<()> {
        let vault = BackupVault::new("storage");
        vault.reset("abc")?;
        assert_eq!(vault.read_manifest("abc")?, None);

        let entries = vec![SnapshotEntry {
            kind: Kind::File,
            destination: "/home/alice/.bashrc".into(),
            snapshot: "home/alice/.bashrc".into(),
        }];
        vault.write_manifest("abc", &entries)?;

        assert_eq!(vault.read_manifest("abc")?, Some(entries));
        let configured: [Triple; 0] = [];
        assert_eq!(
            vault.restorable("abc", &configured)?,
            vec![Triple::new(
                Kind::File,
                "storage/.backup/abc/home/alice/.bashrc",
                "/home/alice/.bashrc"
            )]
        );

        Ok(())
    }

    #[sealed_test]
    fn restorable_without_manifest_uses_existing_mirrors() -> anyhow::Result<()> {
        let vault = BackupVault::new("storage");
        vault.reset("abc")?;
        let mirror = vault.mirror("abc", "/home/alice/.bashrc");
        mkdirp(mirror.parent().unwrap())?;
        fs::write(&mirror, "export X=1")?;

        let triples = [
            Triple::new(Kind::Unknown, "/s/.bashrc", "/home/alice/.bashrc"),
            Triple::new(Kind::Unknown, "/s/.zshrc", "/home/alice/.zshrc"),
        ];

        assert_eq!(
            vault.restorable("abc", &triples)?,
            vec![Triple::new(Kind::Unknown, mirror, "/home/alice/.bashrc")]
        );

        Ok(())
    }
}

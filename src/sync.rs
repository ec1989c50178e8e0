// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Settings reconciliation.
//!
//! The [`Engine`] reconciles the canonical copies of every setting in the
//! storage volume with their destinations on this workstation. All operations
//! work on [`Triple`]s expanded from the configured settings, one at a time and
//! strictly in order.
//!
//! Batch operations never stop at a failing triple. Every triple ends in an
//! [`Outcome`] that is collected into a [`Report`]. The only thing that stops
//! an operation midway is the user canceling a prompt, which yields
//! [`EngineError::Canceled`] carrying everything completed up to that point.
//! Completed triples are never rolled back.

pub mod materialize;
pub mod outcome;
pub mod privilege;
pub mod state;
pub mod triple;
pub mod vault;

use crate::console::{Canceled, Console, Level};
use outcome::{Outcome, Report, SkipReason, TripleError, TripleReport};
use privilege::{Escalating, Privileged};
use state::{StateError, SyncRecord, SyncedStateStore};
use triple::Triple;
use vault::{BackupVault, SnapshotEntry, VaultError};

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Whether an existing destination may be replaced without asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    /// Ask user before replacing anything.
    Confirm,

    /// Replace without asking.
    Force,
}

impl From<bool> for Overwrite {
    fn from(force: bool) -> Self {
        if force {
            Self::Force
        } else {
            Self::Confirm
        }
    }
}

/// Result of [`Engine::sync`].
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Backup taken first, because none existed yet.
    pub backup: Option<Report>,

    /// Outcome of linking every triple.
    pub links: Report,
}

/// Backup and sync status of this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub backed_up: bool,
    pub synced: bool,
}

/// Reconcile storage volume with workstation.
#[derive(Debug)]
pub struct Engine<C, P = Escalating>
where
    C: Console,
    P: Privileged,
{
    triples: Vec<Triple>,
    machine_id: String,
    state: SyncedStateStore,
    vault: BackupVault,
    console: C,
    privilege: P,
}

impl<C, P> Engine<C, P>
where
    C: Console,
    P: Privileged,
{
    /// Construct new engine.
    ///
    /// Triples run from storage to workstation. State and backups live in
    /// the storage directory, keyed by machine identifier.
    pub fn new(
        triples: Vec<Triple>,
        storage: impl Into<PathBuf>,
        machine_id: impl Into<String>,
        console: C,
        privilege: P,
    ) -> Self {
        let storage = storage.into();
        Self {
            triples,
            machine_id: machine_id.into(),
            state: SyncedStateStore::new(&storage),
            vault: BackupVault::new(&storage),
            console,
            privilege,
        }
    }

    /// Triples this engine works on.
    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// Sync state store of storage volume.
    pub fn state(&self) -> &SyncedStateStore {
        &self.state
    }

    /// Backup vault of storage volume.
    pub fn vault(&self) -> &BackupVault {
        &self.vault
    }

    /// Snapshot of this machine exists.
    pub fn is_backed_up(&self) -> bool {
        self.vault.exists(&self.machine_id)
    }

    /// This machine is synced.
    ///
    /// Without a state record, the machine counts as synced when every
    /// existing destination is a symbolic link.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::State`] if state cannot be read.
    pub fn is_synced(&self) -> Result<bool> {
        if let Some(records) = self.state.get(&self.machine_id)? {
            return Ok(records.iter().any(|record| record.synced));
        }

        let mut existing = self
            .triples
            .iter()
            .filter_map(|triple| triple.destination.symlink_metadata().ok())
            .peekable();
        if existing.peek().is_none() {
            return Ok(false);
        }

        Ok(existing.all(|meta| meta.file_type().is_symlink()))
    }

    /// Backup and sync status of this machine.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::State`] if state cannot be read.
    pub fn status(&self) -> Result<Status> {
        Ok(Status {
            backed_up: self.is_backed_up(),
            synced: self.is_synced()?,
        })
    }

    /// Snapshot every existing destination of this machine.
    ///
    /// Any previous snapshot of this machine is discarded first.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Vault`] if snapshot or its manifest cannot be
    ///   written.
    #[instrument(skip(self), level = "debug")]
    pub fn backup(&self) -> Result<Report> {
        self.console.report(Level::Log, "Backing up destinations");
        self.vault.reset(&self.machine_id)?;

        let mut report = Report::new();
        let mut entries = Vec::new();
        for triple in &self.triples {
            let live = Triple::new(
                triple.kind,
                &triple.destination,
                self.vault.mirror(&self.machine_id, &triple.destination),
            );
            self.console.step(&live.to_string());

            let outcome = self.copy_replace(&live, Overwrite::Force)?;
            if outcome.is_done() {
                let kind = live.resolve_kind().unwrap_or(live.kind);
                let snapshot = live
                    .destination
                    .strip_prefix(self.vault.snapshot_path(&self.machine_id))
                    .map(PathBuf::from)
                    .unwrap_or_default();
                entries.push(SnapshotEntry {
                    kind,
                    destination: live.source.clone(),
                    snapshot,
                });
            }
            report.push(TripleReport::new(live, outcome));
        }

        self.vault.write_manifest(&self.machine_id, &entries)?;
        info!("backed up {} of {} destinations", report.done(), report.len());

        Ok(report)
    }

    /// Copy snapshot of this machine back to workstation.
    ///
    /// One confirmation covers the whole restore. Existing destinations are
    /// then replaced without further questions.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::NoBackup`] if this machine has no snapshot.
    /// - Return [`EngineError::Canceled`] if user does not confirm.
    /// - Return [`EngineError::Vault`] if snapshot manifest cannot be read.
    #[instrument(skip(self), level = "debug")]
    pub fn restore(&self) -> Result<Report> {
        if !self.is_backed_up() {
            return Err(EngineError::NoBackup {
                machine_id: self.machine_id.clone(),
            });
        }

        let mut report = Report::new();
        let answer = self.console.confirm(
            "Restoring will overwrite your current settings with the backup. \
             Do you wish to continue?",
        );
        match answer {
            Ok(answer) if answer.is_proceed() => {}
            _ => return Err(EngineError::Canceled { completed: report }),
        }

        for triple in self.vault.restorable(&self.machine_id, &self.triples)? {
            self.console.step(&triple.to_string());
            let outcome = self.copy_replace(&triple, Overwrite::Force)?;
            report.push(TripleReport::new(triple, outcome));
        }

        Ok(report)
    }

    /// Copy workstation destinations into storage volume.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Canceled`] if user cancels an overwrite
    ///   prompt.
    #[instrument(skip(self), level = "debug")]
    pub fn push(&self, overwrite: Overwrite) -> Result<Report> {
        let triples = self.triples.iter().cloned().map(Triple::reversed);
        self.copy_all(triples, overwrite)
    }

    /// Copy storage volume onto workstation destinations.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Canceled`] if user cancels an overwrite
    ///   prompt.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self, overwrite: Overwrite) -> Result<Report> {
        self.copy_all(self.triples.iter().cloned(), overwrite)
    }

    /// Replace workstation destinations with links into storage volume.
    ///
    /// Takes a backup first if this machine has none. Sync state of this
    /// machine is replaced once every triple has been processed.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Vault`] if initial backup fails.
    /// - Return [`EngineError::State`] if sync state cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn sync(&self) -> Result<SyncReport> {
        let backup = if self.is_backed_up() {
            None
        } else {
            Some(self.backup()?)
        };

        let mut links = Report::new();
        let mut records = Vec::with_capacity(self.triples.len());
        for triple in &self.triples {
            self.console.step(&triple.to_string());
            let outcome = self.link_replace(triple);
            records.push(match &outcome {
                Outcome::Done => SyncRecord::synced(&triple.source, &triple.destination),
                Outcome::Skipped(reason) => {
                    SyncRecord::unsynced(&triple.source, &triple.destination, reason.to_string())
                }
                Outcome::Failed(error) => {
                    SyncRecord::unsynced(&triple.source, &triple.destination, error.to_string())
                }
            });
            links.push(TripleReport::new(triple.clone(), outcome));
        }

        // INVARIANT: State is written once, after every triple was processed.
        self.state.put(&self.machine_id, records)?;
        info!("linked {} of {} destinations", links.done(), links.len());

        Ok(SyncReport { backup, links })
    }

    /// Replace links made by sync with real copies of their sources.
    ///
    /// Only triples recorded as synced are touched. Without a state record,
    /// every configured triple is treated as synced. Sync state of this
    /// machine is removed afterwards.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::State`] if sync state cannot be read or
    ///   removed.
    #[instrument(skip(self), level = "debug")]
    pub fn unsync(&self) -> Result<Report> {
        let candidates: Vec<(Triple, bool)> = match self.state.get(&self.machine_id)? {
            Some(records) => records
                .into_iter()
                .map(|record| {
                    let kind = self
                        .triples
                        .iter()
                        .find(|triple| {
                            triple.source == record.source
                                && triple.destination == record.destination
                        })
                        .map(|triple| triple.kind)
                        .unwrap_or_default();
                    (Triple::new(kind, record.source, record.destination), record.synced)
                })
                .collect(),
            None => {
                debug!("no sync state for {:?}, using configured settings", self.machine_id);
                self.triples.iter().cloned().map(|triple| (triple, true)).collect()
            }
        };

        let mut report = Report::new();
        for (triple, synced) in candidates {
            self.console.step(&triple.to_string());
            let outcome = if synced {
                self.unlink_replace(&triple)
            } else {
                Outcome::Skipped(SkipReason::NotSynced)
            };
            report.push(TripleReport::new(triple, outcome));
        }

        self.state.remove(&self.machine_id)?;
        info!("unlinked {} of {} destinations", report.done(), report.len());

        Ok(report)
    }

    fn copy_all(
        &self,
        triples: impl IntoIterator<Item = Triple>,
        overwrite: Overwrite,
    ) -> Result<Report> {
        let mut report = Report::new();
        for triple in triples {
            self.console.step(&triple.to_string());
            let outcome = match self.copy_replace(&triple, overwrite) {
                Ok(outcome) => outcome,
                Err(Canceled) => return Err(EngineError::Canceled { completed: report }),
            };
            report.push(TripleReport::new(triple, outcome));
        }

        Ok(report)
    }

    fn copy_replace(
        &self,
        triple: &Triple,
        overwrite: Overwrite,
    ) -> std::result::Result<Outcome, Canceled> {
        if !materialize::exists(&triple.source) {
            return Ok(Outcome::Skipped(SkipReason::NoSource));
        }

        if materialize::exists(&triple.destination) {
            if materialize::same_entry(&triple.source, &triple.destination) {
                debug!(
                    "{:?} already is {:?}",
                    triple.destination.display(),
                    triple.source.display()
                );
                return Ok(Outcome::Done);
            }

            if overwrite == Overwrite::Confirm {
                let question = format!(
                    "{:?} already exists. Do you wish to overwrite it?",
                    triple.destination.display()
                );
                if !self.console.confirm(&question)?.is_proceed() {
                    return Ok(Outcome::Skipped(SkipReason::UserDeclined));
                }
            }
        }

        Ok(self.replace_with_copy(triple).into())
    }

    fn replace_with_copy(&self, triple: &Triple) -> std::result::Result<(), TripleError> {
        let kind = triple
            .resolve_kind()
            .map_err(TripleError::io("inspect", &triple.source))?;
        self.clear(&triple.destination)?;
        materialize::copy(kind, &triple.source, &triple.destination)
    }

    fn link_replace(&self, triple: &Triple) -> Outcome {
        if !triple.source.exists() {
            return Outcome::Skipped(SkipReason::NoSource);
        }

        let result = self
            .clear(&triple.destination)
            .and_then(|_| materialize::link(&triple.source, &triple.destination));
        result.into()
    }

    fn unlink_replace(&self, triple: &Triple) -> Outcome {
        if !triple.source.exists() {
            return Outcome::Skipped(SkipReason::NoSource);
        }

        let result = self.verify_link(triple).and_then(|_| {
            let kind = triple
                .resolve_kind()
                .map_err(TripleError::io("inspect", &triple.source))?;
            self.clear(&triple.destination)?;
            materialize::copy(kind, &triple.source, &triple.destination)
        });
        result.into()
    }

    fn verify_link(&self, triple: &Triple) -> std::result::Result<(), TripleError> {
        let path = &triple.destination;
        let meta = match path.symlink_metadata() {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(TripleError::DestinationMissing { path: path.clone() });
            }
            Err(err) => return Err(TripleError::io("inspect", path)(err)),
        };

        if !meta.file_type().is_symlink() {
            return Err(TripleError::NotASymlink { path: path.clone() });
        }

        let actual = fs::read_link(path).map_err(TripleError::io("read", path))?;
        if actual != triple.source {
            return Err(TripleError::SymlinkMismatch {
                path: path.clone(),
                expected: triple.source.clone(),
                actual,
            });
        }

        Ok(())
    }

    // INVARIANT: Ownership and permissions are fixed before anything is deleted.
    fn clear(&self, path: &Path) -> std::result::Result<(), TripleError> {
        if !materialize::exists(path) {
            return Ok(());
        }

        self.privilege.ensure_writable(path)?;
        materialize::remove(path)
    }
}

impl From<Canceled> for EngineError {
    fn from(_: Canceled) -> Self {
        Self::Canceled {
            completed: Report::new(),
        }
    }
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// User canceled operation midway.
    #[error("operation canceled by user")]
    Canceled { completed: Report },

    /// Restore requested without a snapshot.
    #[error("no backup exists for machine {machine_id:?}")]
    NoBackup { machine_id: String },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Friendly result alias :3
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

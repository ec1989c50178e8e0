// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-invocation context.
//!
//! Everything an operation needs to know about this invocation is gathered
//! into one [`Context`] up front: the setting catalog, the path resolver built
//! from its routes, the machine identifier, and the invoking user. Components
//! receive what they need from it explicitly.

use crate::{
    catalog::{CatalogError, SettingCatalog},
    config::StorageSettings,
    console::{Canceled, Console, Level},
    host::{self, HostError},
    path::{self, NoWayHome, PathResolver},
    sync::{
        materialize,
        outcome::TripleError,
        privilege::{Escalating, Privileged},
        triple::{classify, expand_all, Triple},
        Engine,
    },
};

use glob::{glob_with, MatchOptions, Pattern, PatternError};
use mkdirp::mkdirp;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Everything known about this invocation.
#[derive(Debug, Clone)]
pub struct Context {
    catalog: SettingCatalog,
    resolver: PathResolver,
    machine_id: String,
    user: String,
}

impl Context {
    /// Load context from configuration file and host.
    ///
    /// # Errors
    ///
    /// - Return [`ContextError::Catalog`] if configuration cannot be loaded.
    /// - Return [`ContextError::Host`] if machine or user cannot be
    ///   identified.
    /// - Return [`ContextError::Home`] if home directory is unknown.
    pub fn load(config_path: impl Into<PathBuf>) -> Result<Self> {
        let catalog = SettingCatalog::open(config_path)?;
        let machine_id = host::machine_id()?;
        let user = host::current_user()?;
        let home = path::home_dir()?;

        Ok(Self::new(catalog, machine_id, user, home))
    }

    /// Construct new context from already known parts.
    pub fn new(
        catalog: SettingCatalog,
        machine_id: impl Into<String>,
        user: impl Into<String>,
        home: impl Into<PathBuf>,
    ) -> Self {
        let user = user.into();
        let resolver = PathResolver::new(catalog.config().routes.clone(), &user, home);
        Self {
            catalog,
            resolver,
            machine_id: machine_id.into(),
            user,
        }
    }

    pub fn catalog(&self) -> &SettingCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut SettingCatalog {
        &mut self.catalog
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn machine_id(&self) -> &str {
        self.machine_id.as_str()
    }

    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    /// Absolute path to storage volume.
    pub fn storage_root(&self) -> PathBuf {
        self.resolver.merge(&self.catalog.config().storage.root)
    }

    /// Absolute path to Mync's directory inside storage volume.
    pub fn storage_dir(&self) -> PathBuf {
        self.resolver
            .join(self.storage_root(), &self.catalog.config().storage.directory)
    }

    /// Expand every configured setting into triples.
    pub fn triples(&self) -> Vec<Triple> {
        expand_all(self.catalog.settings(), &self.resolver, &self.storage_dir())
    }

    /// Construct engine that escalates through `sudo`.
    pub fn engine<C>(&self, console: C) -> Engine<C>
    where
        C: Console,
    {
        self.engine_with(console, Escalating::new(&self.user))
    }

    /// Construct engine over custom privilege policy.
    pub fn engine_with<C, P>(&self, console: C, privilege: P) -> Engine<C, P>
    where
        C: Console,
        P: Privileged,
    {
        Engine::new(
            self.triples(),
            self.storage_dir(),
            &self.machine_id,
            console,
            privilege,
        )
    }

    /// Walk user through choosing storage location.
    ///
    /// The storage volume must already exist, so the user is asked again
    /// until it does. Empty answers keep the current value. Both answers are
    /// persisted, then the storage directory is created inside the volume.
    ///
    /// # Errors
    ///
    /// - Return [`ContextError::Canceled`] if user aborts a prompt.
    /// - Return [`ContextError::Catalog`] if storage cannot be persisted.
    /// - Return [`ContextError::Storage`] if storage directory cannot be
    ///   created.
    #[instrument(skip(self, console), level = "debug")]
    pub fn setup(&mut self, console: &impl Console) -> Result<PathBuf> {
        let current = self.catalog.config().storage.clone();
        console.report(
            Level::Log,
            "Mync keeps your settings in a storage volume shared across your workstations",
        );

        let root = loop {
            let answer = console.ask("Storage volume to use:", &current.root)?;
            let root = match answer.trim() {
                "" => current.root.clone(),
                root => root.to_string(),
            };

            if self.resolver.merge(&root).is_dir() {
                break root;
            }
            console.report(
                Level::Warning,
                &format!("storage location {root:?} cannot be found, try again"),
            );
        };

        let answer = console.ask("Name of Mync's directory inside of it:", &current.directory)?;
        let directory = match answer.trim() {
            "" => current.directory,
            directory => directory.to_string(),
        };

        self.catalog.set_storage(StorageSettings { root, directory })?;
        let storage = self.storage_dir();
        mkdirp(&storage).map_err(|err| ContextError::Storage {
            source: err,
            path: storage.clone(),
        })?;
        console.report(
            Level::Success,
            &format!("storage ready at {:?}, back up with `mync backup` next", storage.display()),
        );

        Ok(storage)
    }

    /// Move storage to new volume.
    ///
    /// Everything inside the old storage directory, hidden entries included,
    /// is moved into the new one. Only then is the new root persisted in token
    /// form, so a failed move leaves the configuration pointing at the old
    /// storage.
    ///
    /// # Errors
    ///
    /// - Return [`ContextError::StorageMissing`] if new root does not exist.
    /// - Return [`ContextError::Catalog`] if new root cannot be persisted.
    /// - Return [`ContextError::Storage`] or [`ContextError::Move`] if
    ///   contents cannot be moved.
    #[instrument(skip(self, root), level = "debug")]
    pub fn set_storage(&mut self, root: impl AsRef<str>) -> Result<StorageChange> {
        let merged = self.resolver.merge(root.as_ref());
        if !merged.is_dir() {
            return Err(ContextError::StorageMissing { path: merged });
        }

        let old_dir = self.storage_dir();
        if merged == self.storage_root() {
            return Ok(StorageChange::Unchanged(old_dir));
        }

        let new_dir = self
            .resolver
            .join(&merged, &self.catalog.config().storage.directory);
        info!("move storage from {:?} to {:?}", old_dir.display(), new_dir.display());
        mkdirp(&new_dir).map_err(|err| ContextError::Storage {
            source: err,
            path: new_dir.clone(),
        })?;

        let moved = if old_dir.is_dir() {
            move_contents(&old_dir, &new_dir)?
        } else {
            debug!("nothing to move, {:?} does not exist", old_dir.display());
            0
        };
        self.catalog.set_storage_root(self.resolver.unmerge(&merged))?;

        Ok(StorageChange::Moved {
            from: old_dir,
            to: new_dir,
            moved,
        })
    }
}

/// Result of changing storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChange {
    /// Requested root already is the storage root.
    Unchanged(PathBuf),

    /// Storage moved, along with number of entries moved.
    Moved {
        from: PathBuf,
        to: PathBuf,
        moved: usize,
    },
}

fn move_contents(from: &Path, to: &Path) -> Result<usize> {
    let pattern = format!("{}/*", Pattern::escape(&from.to_string_lossy()));
    let options = MatchOptions {
        require_literal_leading_dot: false,
        ..MatchOptions::new()
    };

    let mut moved = 0;
    for entry in glob_with(&pattern, options)? {
        let entry = entry.map_err(|err| {
            let path = err.path().to_path_buf();
            ContextError::Storage {
                source: err.into(),
                path,
            }
        })?;

        // INVARIANT: Never move an ancestor of the new storage into itself.
        if to.starts_with(&entry) {
            warn!("leave {:?} in place, it holds the new storage", entry.display());
            continue;
        }

        let Some(name) = entry.file_name() else {
            continue;
        };
        let target = to.join(name);
        if fs::rename(&entry, &target).is_err() {
            // Different file systems, copy across instead.
            let kind = classify(&entry).map_err(TripleError::io("inspect", &entry))?;
            materialize::copy(kind, &entry, &target)?;
            materialize::remove(&entry)?;
        }
        moved += 1;
    }

    Ok(moved)
}

/// Context error types.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Home(#[from] NoWayHome),

    /// New storage root does not exist.
    #[error("storage location {:?} does not exist", path.display())]
    StorageMissing { path: PathBuf },

    /// Storage directory could not be accessed.
    #[error("failed to access storage {:?}", path.display())]
    Storage {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Storage contents could not be moved.
    #[error("failed to move storage contents")]
    Move(#[from] TripleError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Canceled(#[from] Canceled),
}

/// Friendly result alias :3
pub type Result<T, E = ContextError> = std::result::Result<T, E>;

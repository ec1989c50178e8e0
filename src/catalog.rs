// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Setting catalog management.
//!
//! The __setting catalog__ is the ordered listing of settings stored in the
//! configuration file. Every mutation is written back to the configuration
//! file in full before returning, so no uncommitted change survives process
//! exit.
//!
//! # Conflicts
//!
//! Names are treated as unique handles, and destinations are practically
//! unique, because two settings writing the same workstation path would fight
//! each other. Adding a setting that shares either with an existing entry is a
//! conflict that the user must explicitly agree to resolve by replacing the
//! existing entry.

use crate::{
    config::{Config, ConfigError, Setting, StorageSettings},
    console::{Console, Level},
};

use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Ordered, persisted listing of settings.
#[derive(Debug, Clone)]
pub struct SettingCatalog {
    path: PathBuf,
    config: Config,
}

impl SettingCatalog {
    /// Open catalog backed by configuration file at target path.
    ///
    /// Writes a default configuration file if none exists yet.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::InvalidConfiguration`] if configuration file
    ///   cannot be parsed.
    /// - Return [`CatalogError::ReadConfig`] or [`CatalogError::WriteConfig`]
    ///   for I/O failures.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            info!("write default configuration to {:?}", path.display());
            let catalog = Self {
                path,
                config: Config::default(),
            };
            catalog.persist()?;
            return Ok(catalog);
        }

        debug!("load configuration from {:?}", path.display());
        let content = read_to_string(&path).map_err(|err| CatalogError::ReadConfig {
            source: err,
            path: path.clone(),
        })?;
        let config = content
            .parse()
            .map_err(|err| CatalogError::InvalidConfiguration {
                source: err,
                path: path.clone(),
            })?;

        Ok(Self { path, config })
    }

    /// Path to backing configuration file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// All settings in persisted order.
    pub fn settings(&self) -> &[Setting] {
        self.config.settings.as_slice()
    }

    /// List setting names in persisted order.
    pub fn list(&self) -> Vec<&str> {
        self.config
            .settings
            .iter()
            .map(|setting| setting.name.as_str())
            .collect()
    }

    /// Find every setting with given name.
    ///
    /// Names are not enforced unique on disk, since users can edit the file by
    /// hand. Caller decides what to do with duplicates.
    pub fn info(&self, name: impl AsRef<str>) -> Vec<&Setting> {
        self.config
            .settings
            .iter()
            .filter(|setting| setting.name == name.as_ref())
            .collect()
    }

    /// Add new setting.
    ///
    /// An existing setting with the same destination or the same name is a
    /// conflict. The user must confirm before all conflicting entries are
    /// removed and the new setting is appended.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::Canceled`] if user does not confirm conflict
    ///   resolution. Catalog is left unchanged.
    /// - Return [`CatalogError::WriteConfig`] if catalog cannot be persisted.
    #[instrument(skip(self, setting, console), level = "debug")]
    pub fn add(&mut self, setting: Setting, console: &impl Console) -> Result<Added> {
        let conflicts = self
            .config
            .settings
            .iter()
            .filter(|existing| {
                existing.destination == setting.destination || existing.name == setting.name
            })
            .cloned()
            .collect::<Vec<_>>();

        if !conflicts.is_empty() {
            console.report(
                Level::Warning,
                "A setting with the given name or destination already exists.",
            );
            for conflict in &conflicts {
                describe(console, conflict);
            }

            let answer = console
                .confirm("Continuing will overwrite the setting. Do you wish to continue?")
                .map_err(|_| CatalogError::Canceled)?;
            if !answer.is_proceed() {
                return Err(CatalogError::Canceled);
            }

            self.config.settings.retain(|existing| !conflicts.contains(existing));
        }

        info!("add setting {:?}", setting.name);
        self.config.settings.push(setting);
        self.persist()?;

        if conflicts.is_empty() {
            Ok(Added::New)
        } else {
            Ok(Added::Replaced(conflicts))
        }
    }

    /// Remove every setting with given name.
    ///
    /// User must confirm the removal.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::NotFound`] if no setting has given name.
    /// - Return [`CatalogError::Canceled`] if user does not confirm.
    /// - Return [`CatalogError::WriteConfig`] if catalog cannot be persisted.
    #[instrument(skip(self, console), level = "debug")]
    pub fn remove(&mut self, name: &str, console: &impl Console) -> Result<Vec<Setting>> {
        let matches = self.info(name).into_iter().cloned().collect::<Vec<_>>();
        if matches.is_empty() {
            return Err(CatalogError::NotFound { name: name.into() });
        }

        console.report(Level::Warning, "The following setting was found:");
        for setting in &matches {
            describe(console, setting);
        }

        let answer = console
            .confirm("Continuing will delete the setting. Do you wish to continue?")
            .map_err(|_| CatalogError::Canceled)?;
        if !answer.is_proceed() {
            return Err(CatalogError::Canceled);
        }

        info!("remove setting {name:?}");
        self.config.settings.retain(|setting| setting.name != name);
        self.persist()?;

        Ok(matches)
    }

    /// Replace storage root.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::WriteConfig`] if catalog cannot be persisted.
    pub fn set_storage_root(&mut self, root: impl Into<String>) -> Result<()> {
        self.config.storage.root = root.into();
        self.persist()
    }

    /// Replace storage location, both volume and directory.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::WriteConfig`] if configuration cannot be
    ///   written.
    pub fn set_storage(&mut self, storage: StorageSettings) -> Result<()> {
        self.config.storage = storage;
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let parent = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(parent) = parent {
            mkdirp::mkdirp(parent).map_err(|err| CatalogError::WriteConfig {
                source: err,
                path: self.path.clone(),
            })?;
        }

        write(&self.path, self.config.to_string()).map_err(|err| CatalogError::WriteConfig {
            source: err,
            path: self.path.clone(),
        })
    }
}

/// Result of adding a setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Added {
    /// No conflicts existed.
    New,

    /// Conflicting settings were replaced.
    Replaced(Vec<Setting>),
}

fn describe(console: &impl Console, setting: &Setting) {
    console.report(Level::Warning, &format!("name: {}", setting.name));
    console.report(Level::Warning, &format!("source: {}", setting.source));
    console.report(Level::Warning, &format!("destination: {}", setting.destination));
    console.report(Level::Warning, &format!("files: {}", setting.files.join(", ")));
    console.report(Level::Warning, &format!("folders: {}", setting.folders.join(", ")));
}

/// Setting catalog error types.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Configuration file is malformed.
    #[error("invalid configuration file at {:?}", path.display())]
    InvalidConfiguration {
        #[source]
        source: ConfigError,
        path: PathBuf,
    },

    /// Configuration file cannot be read.
    #[error("failed to read configuration file at {:?}", path.display())]
    ReadConfig {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Configuration file cannot be written.
    #[error("failed to write configuration file at {:?}", path.display())]
    WriteConfig {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// No setting has target name.
    #[error("no setting named {name:?}")]
    NotFound { name: String },

    /// User did not confirm change.
    #[error("catalog change canceled, all settings were left intact")]
    Canceled,
}

/// Friendly result alias :3
pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

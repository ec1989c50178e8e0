// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the configuration file that Mync uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! [`SettingCatalog`](crate::catalog::SettingCatalog) to figure out.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Mync configuration layout.
///
/// # General Layout
///
/// The configuration file is composed of three parts: storage, routes, and
/// settings. The storage section locates the shared storage volume that holds
/// the canonical copy of every setting. The routes section names root aliases
/// that any path in the file may reference. Finally, each setting maps a
/// storage-relative source to a workstation destination.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Location of shared storage.
    pub storage: StorageSettings,

    /// Named root aliases referenced as `:name` tokens.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<String, String>,

    /// Ordered listing of settings.
    #[serde(default, rename = "setting", skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<Setting>,
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Names are the only handle users have on a setting.
        if let Some(setting) = config.settings.iter().find(|s| s.name.trim().is_empty()) {
            return Err(ConfigError::UnnamedSetting {
                destination: setting.destination.clone(),
            });
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Shared storage location.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Storage volume, e.g., a cloud synced folder. May contain route tokens.
    pub root: String,

    /// Directory inside of storage volume that Mync owns.
    pub directory: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: "~/Dropbox".into(),
            directory: "mync".into(),
        }
    }
}

/// A named mapping between storage and workstation.
///
/// If neither `files` nor `folders` are given, then the setting itself is
/// treated as one file or folder whose kind is determined at runtime.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Setting {
    /// Unique name of setting.
    pub name: String,

    /// Path relative to storage directory.
    pub source: String,

    /// Path on the workstation.
    pub destination: String,

    /// Files under source and destination to process individually.
    #[serde(default)]
    pub files: Vec<String>,

    /// Folders under source and destination to process individually.
    #[serde(default)]
    pub folders: Vec<String>,
}

impl Setting {
    /// Construct new setting that is processed as a whole.
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            files: Vec::new(),
            folders: Vec::new(),
        }
    }

    /// Set explicit files to process.
    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Set explicit folders to process.
    pub fn with_folders(mut self, folders: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.folders = folders.into_iter().map(Into::into).collect();
        self
    }

    /// Setting is decomposed into explicit files or folders.
    pub fn is_decomposed(&self) -> bool {
        !self.files.is_empty() || !self.folders.is_empty()
    }
}

/// Split comma-delimited listing into trimmed, non-empty entries.
pub fn split_listing(listing: &str) -> Vec<String> {
    listing
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Setting without a name.
    #[error("setting with destination {destination:?} has no name")]
    UnnamedSetting { destination: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

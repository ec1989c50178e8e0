// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resolved units of work.
//!
//! Settings are never processed directly. Each one is first expanded into one
//! or more __triples__ of kind, source path, and destination path. Triples are
//! recomputed for every operation and never persisted.

use crate::{config::Setting, path::PathResolver};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::metadata,
    io,
    path::{Path, PathBuf},
};

/// Kind of file system entry a triple refers to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    File,
    Folder,

    /// Not declared. Determined by inspecting the source at runtime.
    #[default]
    Unknown,
}

impl Display for Kind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::File => "file",
            Self::Folder => "folder",
            Self::Unknown => "setting",
        })
    }
}

/// Determine kind of existing path.
///
/// Follows symbolic links, so a link to a directory is a folder.
///
/// # Errors
///
/// - Return [`io::Error`] if path cannot be inspected.
pub fn classify(path: impl AsRef<Path>) -> io::Result<Kind> {
    if metadata(path.as_ref())?.is_dir() {
        Ok(Kind::Folder)
    } else {
        Ok(Kind::File)
    }
}

/// Resolved unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub kind: Kind,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Triple {
    /// Construct new triple.
    pub fn new(kind: Kind, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Swap source and destination.
    pub fn reversed(self) -> Self {
        Self {
            kind: self.kind,
            source: self.destination,
            destination: self.source,
        }
    }

    /// Declared kind, or kind of source when undeclared.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if kind is undeclared and source cannot be
    ///   inspected.
    pub fn resolve_kind(&self) -> io::Result<Kind> {
        match self.kind {
            Kind::Unknown => classify(&self.source),
            kind => Ok(kind),
        }
    }
}

impl Display for Triple {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} {:?} -> {:?}",
            self.kind,
            self.source.display(),
            self.destination.display()
        )
    }
}

/// Expand setting into triples from storage to workstation.
///
/// Explicit files come first, then explicit folders, each in listed order. A
/// setting with neither is a single triple of unknown kind.
pub fn expand(setting: &Setting, resolver: &PathResolver, storage: &Path) -> Vec<Triple> {
    let source = resolver.join(storage, &setting.source);
    let destination = resolver.merge(&setting.destination);

    if !setting.is_decomposed() {
        return vec![Triple::new(Kind::Unknown, source, destination)];
    }

    let files = setting.files.iter().map(|file| (Kind::File, file));
    let folders = setting.folders.iter().map(|folder| (Kind::Folder, folder));
    files
        .chain(folders)
        .map(|(kind, entry)| {
            Triple::new(
                kind,
                resolver.join(&source, entry),
                resolver.join(&destination, entry),
            )
        })
        .collect()
}

/// Expand every setting in order.
pub fn expand_all<'a>(
    settings: impl IntoIterator<Item = &'a Setting>,
    resolver: &PathResolver,
    storage: &Path,
) -> Vec<Triple> {
    settings
        .into_iter()
        .flat_map(|setting| expand(setting, resolver, storage))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::collections::BTreeMap;

    fn resolver() -> PathResolver {
        PathResolver::new(BTreeMap::new(), "alice", "/home/alice")
    }

    #[test]
    fn expand_whole_setting() {
        let setting = Setting::new("shellrc", "shell/.bashrc", "~/.bashrc");

        let result = expand(&setting, &resolver(), Path::new("/mnt/shared/mync"));

        assert_eq!(
            result,
            vec![Triple::new(
                Kind::Unknown,
                "/mnt/shared/mync/shell/.bashrc",
                "/home/alice/.bashrc"
            )]
        );
    }

    #[test]
    fn expand_files_before_folders() {
        let setting = Setting::new("vim", "vim", "~")
            .with_files([".vimrc", ".gvimrc"])
            .with_folders([".vim"]);

        let result = expand(&setting, &resolver(), Path::new("/mnt/shared/mync"));

        assert_eq!(
            result,
            vec![
                Triple::new(
                    Kind::File,
                    "/mnt/shared/mync/vim/.vimrc",
                    "/home/alice/.vimrc"
                ),
                Triple::new(
                    Kind::File,
                    "/mnt/shared/mync/vim/.gvimrc",
                    "/home/alice/.gvimrc"
                ),
                Triple::new(Kind::Folder, "/mnt/shared/mync/vim/.vim", "/home/alice/.vim"),
            ]
        );
    }

    #[test]
    fn reversed_swaps_paths() {
        let triple = Triple::new(Kind::File, "/a", "/b").reversed();
        assert_eq!(triple, Triple::new(Kind::File, "/b", "/a"));
    }

    #[sealed_test]
    fn resolve_undeclared_kind_from_source() -> anyhow::Result<()> {
        std::fs::create_dir("dir")?;
        std::fs::write("file", "x")?;

        assert_eq!(Triple::new(Kind::Unknown, "dir", "x").resolve_kind()?, Kind::Folder);
        assert_eq!(Triple::new(Kind::Unknown, "file", "x").resolve_kind()?, Kind::File);
        assert_eq!(Triple::new(Kind::File, "dir", "x").resolve_kind()?, Kind::File);
        assert!(Triple::new(Kind::Unknown, "missing", "x").resolve_kind().is_err());

        Ok(())
    }
}

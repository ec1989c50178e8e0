// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File system writes performed on behalf of a triple.

use crate::sync::{outcome::TripleError, triple::Kind};

use mkdirp::mkdirp;
use std::{
    fs::{self, File},
    os::unix::fs::symlink,
    path::Path,
};
use tracing::debug;
use walkdir::WalkDir;

type Result<T, E = TripleError> = std::result::Result<T, E>;

/// Path names an entry, even a dangling symbolic link.
pub(crate) fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Both paths resolve to the same entry on disk.
pub(crate) fn same_entry(lhs: &Path, rhs: &Path) -> bool {
    match (fs::canonicalize(lhs), fs::canonicalize(rhs)) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => false,
    }
}

/// Remove entry at path without following symbolic links.
pub(crate) fn remove(path: &Path) -> Result<()> {
    let meta = path
        .symlink_metadata()
        .map_err(TripleError::io("inspect", path))?;

    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(TripleError::io("remove", path))
    } else {
        fs::remove_file(path).map_err(TripleError::io("remove", path))
    }
}

/// Create missing parent directories of path.
pub(crate) fn create_parent(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };

    if !parent.exists() {
        debug!("create parent directory {:?}", parent.display());
        mkdirp(parent).map_err(TripleError::io("create", parent))?;
    }

    Ok(())
}

/// Materialize full copy of source at absent destination.
///
/// An empty placeholder of the right kind is created first, so the
/// destination has its final type before any content arrives.
pub(crate) fn copy(kind: Kind, source: &Path, destination: &Path) -> Result<()> {
    create_parent(destination)?;

    match kind {
        Kind::Folder => {
            fs::create_dir(destination).map_err(TripleError::io("create", destination))?;
            copy_dir_recursive(source, destination)
        }
        Kind::File | Kind::Unknown => {
            File::create(destination).map_err(TripleError::io("create", destination))?;
            copy_file(source, destination)
        }
    }
}

/// Create symbolic link at absent destination pointing to source.
pub(crate) fn link(source: &Path, destination: &Path) -> Result<()> {
    create_parent(destination)?;
    symlink(source, destination).map_err(TripleError::io("link", destination))
}

fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    // INVARIANT: Extension-less sources are rewritten into the placeholder,
    //   keeping its mode bits.
    if source.extension().is_none() {
        let content = fs::read(source).map_err(TripleError::io("read", source))?;
        return fs::write(destination, content).map_err(TripleError::io("write", destination));
    }

    fs::copy(source, destination).map_err(TripleError::io("copy", source))?;
    Ok(())
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|error| TripleError::Io {
            source: error.into(),
            action: "walk",
            path: source.into(),
        })?;

        // INVARIANT: WalkDir only yields paths below the root it was given.
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(TripleError::io("create", &target))?;
        } else if file_type.is_symlink() {
            let pointee =
                fs::read_link(entry.path()).map_err(TripleError::io("read", entry.path()))?;
            symlink(pointee, &target).map_err(TripleError::io("link", &target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(TripleError::io("copy", entry.path()))?;
        }
    }

    Ok(())
}

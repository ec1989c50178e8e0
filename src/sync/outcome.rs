// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-triple outcomes.
//!
//! Batch operations never stop at the first failing triple. Instead, each
//! triple ends in exactly one [`Outcome`] that is collected into a [`Report`]
//! for the caller to present.

use crate::sync::{privilege::PermissionError, triple::Triple};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

/// Reason a triple was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Expected source path does not exist.
    NoSource,

    /// User declined to overwrite existing destination.
    UserDeclined,

    /// Triple was never successfully synced, so there is nothing to unsync.
    NotSynced,
}

impl Display for SkipReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::NoSource => "source not found",
            Self::UserDeclined => "overwrite declined",
            Self::NotSynced => "not synced",
        })
    }
}

/// Failure of a single triple.
#[derive(Debug, thiserror::Error)]
pub enum TripleError {
    /// Both direct and elevated attempts to claim destination failed.
    #[error(transparent)]
    OwnershipOrPermissionDenied(#[from] PermissionError),

    /// Destination exists, but is not a symbolic link.
    #[error("{:?} is not a symbolic link", path.display())]
    NotASymlink { path: PathBuf },

    /// Destination is a symbolic link, but not to the expected source.
    #[error(
        "{:?} links to {:?} instead of {:?}",
        path.display(),
        actual.display(),
        expected.display()
    )]
    SymlinkMismatch {
        path: PathBuf,
        expected: PathBuf,
        actual: PathBuf,
    },

    /// Destination expected to be a symbolic link does not exist.
    #[error("{:?} does not exist", path.display())]
    DestinationMissing { path: PathBuf },

    /// File system operation failed.
    #[error("failed to {action} {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        action: &'static str,
        path: PathBuf,
    },
}

impl TripleError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            source,
            action,
            path,
        }
    }
}

/// Terminal state of a triple.
#[derive(Debug)]
pub enum Outcome {
    Done,
    Skipped(SkipReason),
    Failed(TripleError),
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<std::result::Result<(), TripleError>> for Outcome {
    fn from(result: std::result::Result<(), TripleError>) -> Self {
        match result {
            Ok(()) => Self::Done,
            Err(error) => Self::Failed(error),
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Done => fmt.write_str("done"),
            Self::Skipped(reason) => write!(fmt, "skipped, {reason}"),
            Self::Failed(error) => write!(fmt, "failed, {error}"),
        }
    }
}

/// Outcome of one triple.
#[derive(Debug)]
pub struct TripleReport {
    pub triple: Triple,
    pub outcome: Outcome,
}

impl TripleReport {
    pub fn new(triple: Triple, outcome: impl Into<Outcome>) -> Self {
        Self {
            triple,
            outcome: outcome.into(),
        }
    }
}

/// Ordered outcomes of one operation.
#[derive(Debug, Default)]
pub struct Report {
    pub entries: Vec<TripleReport>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TripleReport) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn done(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_done()).count()
    }

    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.skip_reason() == Some(reason))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TripleReport> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    /// No triple failed. Skips are not failures.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TripleReport> {
        self.entries.iter()
    }
}

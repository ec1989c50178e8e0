// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workstation settings synchronization.
//!
//! Mync keeps the canonical copy of every registered __setting__ inside a
//! shared storage volume, e.g., a cloud synced folder, and reconciles it with
//! its destination on each workstation. Settings can be copied either way,
//! snapshotted per machine, or replaced by symbolic links into the storage
//! volume.
//!
//! # Machines
//!
//! Many workstations may mount the same storage volume. Each one is told
//! apart by its machine identifier, and only ever touches the sync state and
//! backup snapshot stored under its own identifier.

pub mod catalog;
pub mod config;
pub mod console;
pub mod context;
pub mod host;
pub mod path;
pub mod sync;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host identity.
//!
//! Every workstation sharing a storage volume is told apart by its machine
//! identifier. Synced state and backups are partitioned by it, so it must stay
//! stable across invocations on the same host.

use std::{fs::read_to_string, path::Path, process::Command};
use tracing::debug;

const MACHINE_ID_FILES: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Determine stable identifier of current machine.
///
/// # Errors
///
/// - Return [`HostError::NoMachineId`] if no identifier source is available.
pub fn machine_id() -> Result<String> {
    for path in MACHINE_ID_FILES {
        if let Some(id) = read_machine_id_file(path) {
            debug!("machine id read from {path}");
            return Ok(id);
        }
    }

    if cfg!(target_os = "macos") {
        if let Some(id) = ioreg_platform_uuid() {
            debug!("machine id read from ioreg");
            return Ok(id);
        }
    }

    Err(HostError::NoMachineId)
}

/// Determine name of invoking user.
///
/// Looks up the passwd entry of the effective user, and falls back to the
/// `USER` environment variable.
///
/// # Errors
///
/// - Return [`HostError::NoUser`] if user name cannot be determined.
pub fn current_user() -> Result<String> {
    if let Ok(Some(user)) = nix::unistd::User::from_uid(nix::unistd::Uid::effective()) {
        return Ok(user.name);
    }

    std::env::var("USER")
        .ok()
        .filter(|user| !user.is_empty())
        .ok_or(HostError::NoUser)
}

fn read_machine_id_file(path: impl AsRef<Path>) -> Option<String> {
    read_to_string(path.as_ref())
        .ok()
        .map(|content| content.trim().to_string())
        .filter(|id| !id.is_empty())
}

fn ioreg_platform_uuid() -> Option<String> {
    let output = Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    parse_platform_uuid(&String::from_utf8_lossy(&output.stdout))
}

// Line looks like: "IOPlatformUUID" = "8F7A2B1C-...".
fn parse_platform_uuid(ioreg: &str) -> Option<String> {
    ioreg
        .lines()
        .find(|line| line.contains("\"IOPlatformUUID\""))
        .and_then(|line| line.split('=').nth(1))
        .map(|value| value.trim().trim_matches('"').to_string())
        .filter(|id| !id.is_empty())
}

/// Host identity error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum HostError {
    /// No machine identifier source is available.
    #[error("cannot determine machine identifier of this workstation")]
    NoMachineId,

    /// User name cannot be determined.
    #[error("cannot determine name of current user")]
    NoUser,
}

/// Friendly result alias :3
pub type Result<T, E = HostError> = std::result::Result<T, E>;

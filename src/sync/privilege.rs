// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ownership and permission escalation.
//!
//! Before Mync replaces anything on disk, the entry being replaced must belong
//! to the invoking user and be writable by them. Each fixup is attempted
//! directly first. Only when that fails is it retried through `sudo`, which
//! may prompt the user for their password.

use std::{
    ffi::{OsStr, OsString},
    fs::symlink_metadata,
    io,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument, warn};

/// Make path safe to replace.
pub trait Privileged {
    /// Claim ownership of path for invoking user, and make it writable.
    ///
    /// # Errors
    ///
    /// - Return [`PermissionError`] if both direct and elevated attempts fail.
    fn ensure_writable(&self, path: &Path) -> Result<()>;
}

impl<P> Privileged for &P
where
    P: Privileged + ?Sized,
{
    fn ensure_writable(&self, path: &Path) -> Result<()> {
        (**self).ensure_writable(path)
    }
}

/// Execute external commands.
pub trait CommandRunner {
    /// Run program as invoking user.
    fn run(&self, program: &str, args: &[OsString]) -> io::Result<()>;

    /// Run program with elevated privileges.
    fn run_elevated(&self, program: &str, args: &[OsString]) -> io::Result<()>;
}

/// Run commands on host through `sudo` when elevated.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, program: &str, args: &[OsString]) -> io::Result<()> {
        syscall_non_interactive(program, args)
    }

    fn run_elevated(&self, program: &str, args: &[OsString]) -> io::Result<()> {
        let mut sudo_args: Vec<OsString> = vec![program.into()];
        sudo_args.extend_from_slice(args);
        syscall_interactive("sudo", sudo_args)
    }
}

/// Direct attempt first, elevated retry second.
#[derive(Debug, Clone)]
pub struct Escalating<R = ShellRunner>
where
    R: CommandRunner,
{
    user: String,
    runner: R,
}

impl Escalating<ShellRunner> {
    /// Construct new escalation policy that runs commands on host.
    pub fn new(user: impl Into<String>) -> Self {
        Self::with_runner(user, ShellRunner)
    }
}

impl<R> Escalating<R>
where
    R: CommandRunner,
{
    /// Construct new escalation policy over custom command runner.
    pub fn with_runner(user: impl Into<String>, runner: R) -> Self {
        Self {
            user: user.into(),
            runner,
        }
    }

    fn attempt(
        &self,
        program: &str,
        args: &[OsString],
    ) -> std::result::Result<(), (io::Error, io::Error)> {
        match self.runner.run(program, args) {
            Ok(()) => Ok(()),
            Err(direct) => {
                warn!("{program} failed ({direct}), retrying with elevated privileges");
                self.runner
                    .run_elevated(program, args)
                    .map_err(|elevated| (direct, elevated))
            }
        }
    }
}

impl<R> Privileged for Escalating<R>
where
    R: CommandRunner,
{
    #[instrument(skip(self), level = "debug")]
    fn ensure_writable(&self, path: &Path) -> Result<()> {
        // INVARIANT: Never follow a symbolic link into storage.
        //   - chown must act on the link itself.
        //   - chmod has no meaning for links, so skip it.
        let is_link = symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);

        let owner_flag = if is_link { "-h" } else { "-R" };
        let chown_args: Vec<OsString> = vec![
            owner_flag.into(),
            self.user.as_str().into(),
            path.as_os_str().into(),
        ];
        self.attempt("chown", &chown_args)
            .map_err(|(direct, elevated)| PermissionError::Ownership {
                path: path.into(),
                user: self.user.clone(),
                direct,
                elevated,
            })?;

        if is_link {
            debug!("skip mode change of symbolic link {:?}", path.display());
            return Ok(());
        }

        let chmod_args: Vec<OsString> = vec!["-R".into(), "755".into(), path.as_os_str().into()];
        self.attempt("chmod", &chmod_args)
            .map_err(|(direct, elevated)| PermissionError::Mode {
                path: path.into(),
                direct,
                elevated,
            })
    }
}

fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> io::Result<()> {
    let status = Command::new(cmd.as_ref()).args(args).spawn()?.wait()?;
    if !status.success() {
        return Err(io::Error::other(format!("command {:?} failed", cmd.as_ref())));
    }

    Ok(())
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> io::Result<()> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    if output.status.success() {
        return Ok(());
    }

    // INVARIANT: Chomp trailing newlines.
    let stderr = String::from_utf8_lossy(output.stderr.as_slice());
    let stderr = stderr.trim_end();
    Err(io::Error::other(format!(
        "command {:?} failed: {stderr}",
        cmd.as_ref()
    )))
}

/// Ownership and permission error types.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    /// Ownership could not be claimed.
    #[error("cannot give {user:?} ownership of {:?}: {direct}", path.display())]
    Ownership {
        path: PathBuf,
        user: String,
        direct: io::Error,
        #[source]
        elevated: io::Error,
    },

    /// Path could not be made writable.
    #[error("cannot make {:?} writable: {direct}", path.display())]
    Mode {
        path: PathBuf,
        direct: io::Error,
        #[source]
        elevated: io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PermissionError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::{testing::FakeRunner, *};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::collections::HashSet;

    fn programs(runner: &FakeRunner) -> Vec<(bool, String)> {
        runner
            .calls
            .borrow()
            .iter()
            .map(|(elevated, program, _)| (*elevated, program.clone()))
            .collect()
    }

    #[sealed_test]
    fn direct_success_never_elevates() -> anyhow::Result<()> {
        std::fs::write("target", "x")?;
        let policy = Escalating::with_runner("alice", FakeRunner::default());

        policy.ensure_writable(Path::new("target"))?;

        assert_eq!(
            programs(&policy.runner),
            vec![(false, "chown".into()), (false, "chmod".into())]
        );
        let (_, _, args) = &policy.runner.calls.borrow()[0];
        assert_eq!(args, &vec![OsString::from("-R"), "alice".into(), "target".into()]);

        Ok(())
    }

    #[sealed_test]
    fn direct_failure_retries_elevated() -> anyhow::Result<()> {
        std::fs::write("target", "x")?;
        let runner = FakeRunner {
            fail_direct: HashSet::from(["chown"]),
            ..Default::default()
        };
        let policy = Escalating::with_runner("alice", runner);

        policy.ensure_writable(Path::new("target"))?;

        assert_eq!(
            programs(&policy.runner),
            vec![
                (false, "chown".into()),
                (true, "chown".into()),
                (false, "chmod".into())
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn both_attempts_failing_is_an_error() -> anyhow::Result<()> {
        std::fs::write("target", "x")?;
        let runner = FakeRunner {
            fail_direct: HashSet::from(["chmod"]),
            fail_elevated: HashSet::from(["chmod"]),
            ..Default::default()
        };
        let policy = Escalating::with_runner("alice", runner);

        let result = policy.ensure_writable(Path::new("target"));

        assert!(matches!(result, Err(PermissionError::Mode { .. })));

        Ok(())
    }

    #[sealed_test]
    fn symbolic_link_is_claimed_without_following() -> anyhow::Result<()> {
        std::fs::write("real", "x")?;
        std::os::unix::fs::symlink("real", "link")?;
        let policy = Escalating::with_runner("alice", FakeRunner::default());

        policy.ensure_writable(Path::new("link"))?;

        assert_eq!(programs(&policy.runner), vec![(false, "chown".into())]);
        let (_, _, args) = &policy.runner.calls.borrow()[0];
        assert_eq!(args[0], OsString::from("-h"));

        Ok(())
    }
}

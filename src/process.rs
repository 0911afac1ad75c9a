//! Short-lived helper subprocesses: executable discovery, bounded runs and
//! shell quoting.

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::orchestrator::deadline;
use crate::{AppError, Result};

/// Locate `name` on `PATH`.
#[must_use]
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Run `cmd` to completion, capturing its output.
///
/// The child is killed if `limit` elapses first.
///
/// # Errors
///
/// Returns `AppError::Io` if the process cannot be spawned or awaited, and
/// `AppError::Timeout` when it outlives `limit`.
pub async fn run_bounded(mut cmd: Command, label: &str, limit: Duration) -> Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|err| AppError::Io(format!("failed to spawn {label}: {err}")))?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = deadline::within(label, limit, child.wait_with_output()).await?;
    output.map_err(|err| AppError::Io(format!("failed to wait for {label}: {err}")))
}

/// Run `cmd` like [`run_bounded`] and require a zero exit status.
///
/// # Errors
///
/// Propagates [`run_bounded`] errors and maps a non-zero exit to `fail`
/// carrying the trimmed stderr.
pub async fn run_checked(
    cmd: Command,
    label: &str,
    limit: Duration,
    fail: fn(String) -> AppError,
) -> Result<String> {
    let output = run_bounded(cmd, label, limit).await?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(fail(format!(
            "{label} exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

/// Command-line dialect of the shell a worker is started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellDialect {
    /// `sh`, `bash`, `zsh` and friends.
    #[default]
    Posix,
    /// Windows `PowerShell`.
    PowerShell,
}

impl ShellDialect {
    /// Quote one word so the shell passes it through literally.
    #[must_use]
    pub fn quote(self, value: &str) -> String {
        match self {
            Self::Posix => shell_quote(value),
            Self::PowerShell if is_plain_powershell_word(value) => value.to_owned(),
            Self::PowerShell => powershell_quote(value),
        }
    }

    /// Command line that runs `program` with `args`, every word quoted.
    ///
    /// `PowerShell` treats a quoted first word as a string expression, so the
    /// program goes through the `&` call operator there.
    #[must_use]
    pub fn command_line(self, program: &str, args: &[&str]) -> String {
        let mut line = match self {
            Self::Posix => shell_quote(program),
            Self::PowerShell => format!("& {}", powershell_quote(program)),
        };
        for arg in args {
            line.push(' ');
            line.push_str(&self.quote(arg));
        }
        line
    }
}

/// Quote `value` for a POSIX shell command line.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '=' | ','))
    {
        return value.to_owned();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quote `value` as a `PowerShell` single-quoted literal.
#[must_use]
pub fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_plain_powershell_word(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}

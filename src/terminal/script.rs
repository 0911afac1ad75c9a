//! AppleScript and `PowerShell` runners plus their quoting rules.

use std::time::Duration;

use tokio::process::Command;

use crate::process;
pub use crate::process::powershell_quote;
use crate::{AppError, Result};

/// Deadline for one automation script.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Run an AppleScript through `osascript`, returning trimmed stdout.
///
/// # Errors
///
/// Returns `AppError::Terminal` on a non-zero exit and `AppError::Timeout`
/// when the script hangs.
pub async fn osascript(script: &str, limit: Duration) -> Result<String> {
    let mut cmd = Command::new("osascript");
    cmd.arg("-e").arg(script);
    process::run_checked(cmd, "osascript", limit, AppError::Terminal).await
}

/// Run a `PowerShell` snippet without a profile or console window.
///
/// # Errors
///
/// Returns `AppError::Terminal` on a non-zero exit and `AppError::Timeout`
/// when the script hangs.
pub async fn powershell(script: &str, limit: Duration) -> Result<String> {
    let mut cmd = Command::new("powershell.exe");
    cmd.args(["-NoProfile", "-NonInteractive", "-Command", script]);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    process::run_checked(cmd, "powershell", limit, AppError::Terminal).await
}

/// Quote `value` as an AppleScript string literal.
#[must_use]
pub fn applescript_quote(value: &str) -> String {
    format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

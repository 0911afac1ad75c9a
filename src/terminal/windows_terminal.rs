//! Windows Terminal adapter.
//!
//! Windows are launched with `wt.exe`; text goes in through the clipboard
//! and `SendKeys`, with the previous foreground window and clipboard put back
//! afterwards.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::clipboard;
use super::script::{powershell, powershell_quote, SCRIPT_TIMEOUT};
use super::{TerminalAdapter, TerminalKind, WindowHandle, WindowRequest};
use crate::process;
use crate::{AppError, Result};

/// Pause after `wt.exe` returns so the window exists before the first send.
pub const LAUNCH_SETTLE: Duration = Duration::from_secs(2);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

const FOCUS_TYPE: &str = r#"Add-Type @"
using System;
using System.Runtime.InteropServices;
public static class ConductorFocus {
    [DllImport("user32.dll")] public static extern IntPtr GetForegroundWindow();
    [DllImport("user32.dll")] public static extern bool SetForegroundWindow(IntPtr hWnd);
}
"@"#;

/// Clipboard and `SendKeys` driven Windows Terminal adapter.
#[derive(Debug, Default)]
pub struct WindowsTerminal {
    window: Option<WindowHandle>,
    title: Option<String>,
    child: Option<Child>,
}

impl WindowsTerminal {
    /// Adapter with no window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn program() -> Option<PathBuf> {
        process::find_executable("wt.exe").or_else(|| process::find_executable("wt"))
    }

    async fn open(&mut self, request: &WindowRequest) -> Result<WindowHandle> {
        let program = Self::program()
            .ok_or_else(|| AppError::Unavailable("wt.exe not found".into()))?;

        let child = Command::new(program)
            .args(["-w", "-1", "--title"])
            .arg(&request.title)
            .arg("-d")
            .arg(&request.working_dir)
            .args(["powershell.exe", "-NoExit", "-Command"])
            .arg(launch_command(request))
            .spawn()
            .map_err(|err| AppError::Terminal(format!("failed to launch wt.exe: {err}")))?;

        tokio::time::sleep(LAUNCH_SETTLE).await;

        info!(task_id = %request.task_id, pid = ?child.id(), "Windows Terminal window created");
        let handle = WindowHandle {
            id: request.task_id.clone(),
            socket_path: None,
            window_id: Some(request.title.clone()),
            pid: child.id(),
        };
        self.window = Some(handle.clone());
        self.title = Some(request.title.clone());
        self.child = Some(child);
        Ok(handle)
    }

    async fn deliver(&self, text: &str, press_enter: bool) -> Result<()> {
        let title = self
            .title
            .as_deref()
            .ok_or_else(|| AppError::InvalidState("Windows Terminal adapter has no window".into()))?;

        let script = sendkeys_script(title, press_enter);
        clipboard::paste_with_restore(text.to_owned(), async move {
            powershell(&script, SCRIPT_TIMEOUT).await.map(|_| ())
        })
        .await
    }

    async fn shutdown(&mut self) -> Result<()> {
        let title = self.title.take();
        let Some(handle) = self.window.take() else {
            return Ok(());
        };

        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.start_kill() {
                debug!(%err, "wt.exe launcher already exited");
            }
        }

        let Some(title) = title else {
            return Ok(());
        };
        let script = format!(
            "$wshell = New-Object -ComObject wscript.shell
if ($wshell.AppActivate({title})) {{
    Start-Sleep -Milliseconds 200
    $wshell.SendKeys('%{{F4}}')
}}",
            title = powershell_quote(&title)
        );
        powershell(&script, CLOSE_TIMEOUT).await.map(|_| ()).inspect_err(|err| {
            warn!(%err, window = %handle.id, "failed to close Windows Terminal window");
        })
    }
}

/// `PowerShell` command run in the new tab: environment, then the worker.
#[must_use]
pub fn launch_command(request: &WindowRequest) -> String {
    let mut parts: Vec<String> = request
        .env
        .iter()
        .map(|(key, value)| format!("$env:{key}={}", powershell_quote(value)))
        .collect();
    parts.push(request.command.clone());
    parts.join("; ")
}

/// Script that focuses the worker window, pastes, optionally presses Enter
/// and returns focus to the previous foreground window.
#[must_use]
pub fn sendkeys_script(title: &str, press_enter: bool) -> String {
    let enter = if press_enter {
        "\n    Start-Sleep -Milliseconds 100\n    $wshell.SendKeys('{ENTER}')"
    } else {
        ""
    };
    format!(
        "{FOCUS_TYPE}
$previous = [ConductorFocus]::GetForegroundWindow()
$wshell = New-Object -ComObject wscript.shell
if ($wshell.AppActivate({title})) {{
    Start-Sleep -Milliseconds 200
    $wshell.SendKeys('^v'){enter}
    Start-Sleep -Milliseconds 100
    [void][ConductorFocus]::SetForegroundWindow($previous)
}} else {{
    Write-Error 'worker window not found'
    exit 1
}}",
        title = powershell_quote(title)
    )
}

impl TerminalAdapter for WindowsTerminal {
    fn kind(&self) -> TerminalKind {
        TerminalKind::WindowsTerminal
    }

    fn name(&self) -> &'static str {
        "Windows Terminal"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "windows") && Self::program().is_some()
    }

    fn create_window<'a>(
        &'a mut self,
        request: &'a WindowRequest,
    ) -> BoxFuture<'a, Result<WindowHandle>> {
        self.open(request).boxed()
    }

    fn send_text<'a>(&'a mut self, text: &'a str, press_enter: bool) -> BoxFuture<'a, Result<()>> {
        self.deliver(text, press_enter).boxed()
    }

    fn close_window(&mut self) -> BoxFuture<'_, Result<()>> {
        self.shutdown().boxed()
    }

    fn window(&self) -> Option<&WindowHandle> {
        self.window.as_ref()
    }

    fn clear_window(&mut self) {
        self.window = None;
        self.title = None;
        self.child = None;
    }
}

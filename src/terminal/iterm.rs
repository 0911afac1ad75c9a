//! iTerm2 adapter, scripted through `osascript`.
//!
//! Keystrokes only reach a focused window, so each send briefly brings the
//! worker window forward, pastes, and hands focus back to the app that had it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{info, warn};

use super::clipboard;
use super::script::{applescript_quote, osascript, SCRIPT_TIMEOUT};
use super::{TerminalAdapter, TerminalKind, WindowHandle, WindowRequest};
use crate::process::shell_quote;
use crate::{AppError, Result};

const APP_PATH: &str = "/Applications/iTerm.app";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// AppleScript-driven iTerm2 adapter.
#[derive(Debug)]
pub struct Iterm {
    app_path: PathBuf,
    window: Option<WindowHandle>,
}

impl Default for Iterm {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterm {
    /// Adapter for the standard install location.
    #[must_use]
    pub fn new() -> Self {
        Self {
            app_path: PathBuf::from(APP_PATH),
            window: None,
        }
    }

    async fn open(&mut self, request: &WindowRequest) -> Result<WindowHandle> {
        let output = osascript(&create_script(request), SCRIPT_TIMEOUT).await?;
        let window_id = parse_window_id(&output)?;

        info!(task_id = %request.task_id, window_id, "iTerm window created");
        let handle = WindowHandle {
            id: window_id.clone(),
            socket_path: None,
            window_id: Some(window_id),
            pid: None,
        };
        self.window = Some(handle.clone());
        Ok(handle)
    }

    async fn deliver(&self, text: &str, press_enter: bool) -> Result<()> {
        let window_id = self
            .window
            .as_ref()
            .and_then(|handle| handle.window_id.as_deref())
            .ok_or_else(|| AppError::InvalidState("iTerm adapter has no window".into()))?;

        let script = paste_script(window_id, press_enter);
        clipboard::paste_with_restore(text.to_owned(), async move {
            osascript(&script, SCRIPT_TIMEOUT).await.map(|_| ())
        })
        .await
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.window.take() else {
            return Ok(());
        };
        let Some(window_id) = handle.window_id else {
            return Ok(());
        };
        let script = format!("tell application \"iTerm\"\n    close window id {window_id}\nend tell");
        osascript(&script, CLOSE_TIMEOUT).await.map(|_| ()).inspect_err(|err| {
            warn!(%err, window_id, "failed to close iTerm window");
        })
    }
}

/// AppleScript that opens a window, exports the environment and starts the
/// command. Returns the new window id on stdout.
#[must_use]
pub fn create_script(request: &WindowRequest) -> String {
    let mut lines = vec![
        "tell application \"iTerm\"".to_owned(),
        "    set newWindow to (create window with default profile)".to_owned(),
        "    tell current session of newWindow".to_owned(),
        format!(
            "        write text {}",
            applescript_quote(&format!("cd {}", shell_quote(&request.working_dir.to_string_lossy())))
        ),
        "        delay 0.5".to_owned(),
    ];
    for (key, value) in &request.env {
        lines.push(format!(
            "        write text {}",
            applescript_quote(&format!("export {key}={}", shell_quote(value)))
        ));
        lines.push("        delay 0.2".to_owned());
    }
    lines.push(format!("        write text {}", applescript_quote(&request.command)));
    lines.push("    end tell".to_owned());
    lines.push("    return (id of newWindow)".to_owned());
    lines.push("end tell".to_owned());
    lines.join("\n")
}

/// AppleScript that focuses `window_id`, pastes, optionally presses return,
/// then reactivates the previously frontmost app.
#[must_use]
pub fn paste_script(window_id: &str, press_enter: bool) -> String {
    let enter = if press_enter {
        "\n    delay 0.1\n    keystroke return"
    } else {
        ""
    };
    format!(
        "set frontApp to path to frontmost application as text
tell application \"iTerm\"
    tell window id {window_id}
        select
    end tell
    activate
end tell
delay 0.1
tell application \"System Events\"
    keystroke \"v\" using {{command down}}{enter}
end tell
delay 0.1
activate application frontApp"
    )
}

fn parse_window_id(output: &str) -> Result<String> {
    let id = output.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(id.to_owned())
    } else {
        Err(AppError::Terminal(format!(
            "iTerm returned an unexpected window id '{id}'"
        )))
    }
}

impl TerminalAdapter for Iterm {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Iterm
    }

    fn name(&self) -> &'static str {
        "iTerm"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "macos") && Path::new(&self.app_path).exists()
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
    }
}

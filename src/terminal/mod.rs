//! Terminal adapters.
//!
//! Each variant drives a different emulator through a different OS
//! mechanism: kitty over its remote-control socket, iTerm through
//! AppleScript, Windows Terminal through `PowerShell` `SendKeys`. The focus
//! based variants paste through the system clipboard and put the user's
//! clipboard back afterwards.
//!
//! An adapter instance belongs to exactly one session and tracks at most one
//! window.

pub mod clipboard;
pub mod iterm;
pub mod kitty;
pub mod kitty_protocol;
pub mod script;
pub mod windows_terminal;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

pub use iterm::Iterm;
pub use kitty::Kitty;
pub use windows_terminal::WindowsTerminal;

use crate::models::health::ActivityProbe;
use crate::process::ShellDialect;
use crate::{AppError, Result};

/// Settings value selecting the platform default terminal.
pub const AUTO: &str = "auto";

/// Supported terminal emulators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    /// kitty, controlled over a Unix socket.
    Kitty,
    /// iTerm2, controlled through AppleScript.
    Iterm,
    /// Windows Terminal, controlled through `PowerShell`.
    WindowsTerminal,
}

impl TerminalKind {
    /// Settings-store identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kitty => "kitty",
            Self::Iterm => "iterm",
            Self::WindowsTerminal => "windows_terminal",
        }
    }

    /// Shell the worker command line is handed to.
    #[must_use]
    pub fn shell_dialect(self) -> ShellDialect {
        match self {
            Self::Kitty | Self::Iterm => ShellDialect::Posix,
            Self::WindowsTerminal => ShellDialect::PowerShell,
        }
    }
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminalKind {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "kitty" => Ok(Self::Kitty),
            "iterm" => Ok(Self::Iterm),
            "windows_terminal" => Ok(Self::WindowsTerminal),
            other => Err(AppError::Unavailable(format!(
                "unknown terminal type '{other}'"
            ))),
        }
    }
}

/// Everything needed to open a worker window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    /// Task the window belongs to.
    pub task_id: String,
    /// Shell working directory.
    pub working_dir: PathBuf,
    /// Command line started in the window.
    pub command: String,
    /// Variables exported before `command` runs.
    pub env: BTreeMap<String, String>,
    /// Window title.
    pub title: String,
}

impl WindowRequest {
    /// Request with the conventional title for `task_id`.
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        command: impl Into<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        let task_id = task_id.into();
        let title = format!("Agent Conductor - Task {task_id}");
        Self {
            task_id,
            working_dir: working_dir.into(),
            command: command.into(),
            env,
            title,
        }
    }
}

/// Identifies the window an adapter opened.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WindowHandle {
    /// Adapter-local identifier.
    pub id: String,
    /// Control socket, for socket-driven terminals.
    pub socket_path: Option<PathBuf>,
    /// Emulator window identifier, for script-driven terminals.
    pub window_id: Option<String>,
    /// Launched process, when known.
    pub pid: Option<u32>,
}

/// Uniform capability set over the supported terminal emulators.
pub trait TerminalAdapter: Send + Sync {
    /// Variant discriminator.
    fn kind(&self) -> TerminalKind;

    /// Display name.
    fn name(&self) -> &'static str;

    /// Whether the emulator is installed.
    fn is_available(&self) -> bool;

    /// Open a window running `request.command`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Terminal` if the emulator cannot be launched or
    /// driven, or `AppError::Timeout` if a helper process hangs.
    fn create_window<'a>(
        &'a mut self,
        request: &'a WindowRequest,
    ) -> BoxFuture<'a, Result<WindowHandle>>;

    /// Type `text` into the window, optionally followed by Enter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` without a window, otherwise
    /// `AppError::Terminal` or `AppError::Timeout` on delivery failure.
    fn send_text<'a>(&'a mut self, text: &'a str, press_enter: bool)
        -> BoxFuture<'a, Result<()>>;

    /// Close the window. Always forgets the handle, even on failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Terminal` if the emulator refused to close it.
    fn close_window(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Current window, if any.
    fn window(&self) -> Option<&WindowHandle>;

    /// Forget the window without touching it.
    fn clear_window(&mut self);

    /// Whether a window handle is held.
    fn has_window(&self) -> bool {
        self.window().is_some()
    }

    /// Whether the window still exists. Defaults to [`TerminalAdapter::has_window`].
    fn is_window_alive(&self) -> bool {
        self.has_window()
    }

    /// Native probe for whether the driven program is computing.
    fn is_agent_active(&self) -> BoxFuture<'_, ActivityProbe> {
        async { ActivityProbe::Unsupported }.boxed()
    }
}

/// Build the adapter for `kind`, failing closed when it is not installed.
///
/// # Errors
///
/// Returns `AppError::Unavailable` if the emulator is missing.
pub fn terminal_for(kind: TerminalKind) -> Result<Box<dyn TerminalAdapter>> {
    let adapter = build(kind);
    if adapter.is_available() {
        Ok(adapter)
    } else {
        Err(AppError::Unavailable(format!(
            "{} is not installed",
            adapter.name()
        )))
    }
}

/// Build the adapter for a settings value, resolving [`AUTO`].
///
/// # Errors
///
/// Returns `AppError::Unavailable` for unknown values or when nothing usable
/// is installed.
pub fn terminal_from_name(name: &str) -> Result<Box<dyn TerminalAdapter>> {
    if name.trim() == AUTO {
        default_terminal()
    } else {
        terminal_for(name.parse()?)
    }
}

/// First installed terminal in this platform's preference order.
///
/// # Errors
///
/// Returns `AppError::Unavailable` when none is installed.
pub fn default_terminal() -> Result<Box<dyn TerminalAdapter>> {
    supported_terminal_kinds()
        .iter()
        .map(|kind| build(*kind))
        .find(|adapter| adapter.is_available())
        .ok_or_else(|| AppError::Unavailable("no supported terminal is installed".into()))
}

/// Terminals this platform can drive, in preference order.
#[must_use]
pub fn supported_terminal_kinds() -> &'static [TerminalKind] {
    if cfg!(target_os = "macos") {
        &[TerminalKind::Kitty, TerminalKind::Iterm]
    } else if cfg!(target_os = "windows") {
        &[TerminalKind::WindowsTerminal]
    } else {
        &[TerminalKind::Kitty]
    }
}

/// Installed terminals among [`supported_terminal_kinds`].
#[must_use]
pub fn available_terminals() -> Vec<TerminalKind> {
    supported_terminal_kinds()
        .iter()
        .copied()
        .filter(|kind| build(*kind).is_available())
        .collect()
}

fn build(kind: TerminalKind) -> Box<dyn TerminalAdapter> {
    match kind {
        TerminalKind::Kitty => Box::new(Kitty::discover()),
        TerminalKind::Iterm => Box::new(Iterm::new()),
        TerminalKind::WindowsTerminal => Box::new(WindowsTerminal::new()),
    }
}

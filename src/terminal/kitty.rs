//! kitty adapter.
//!
//! Every window is a dedicated kitty instance listening on its own Unix
//! socket, so text reaches the worker without stealing focus.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericFilePath, ToFsName};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio_util::codec::{Encoder, FramedRead};
use tracing::{debug, info, warn};

use super::kitty_protocol::{activity_from_ls, KittyCodec, KittyCommand};
use super::{TerminalAdapter, TerminalKind, WindowHandle, WindowRequest};
use crate::models::health::ActivityProbe;
use crate::orchestrator::deadline;
use crate::process::{self, shell_quote};
use crate::{AppError, Result};

/// How long to wait for a new instance to open its control socket.
pub const SOCKET_WAIT: Duration = Duration::from_secs(2);
const SOCKET_POLL: Duration = Duration::from_millis(100);
/// Deadline for one control-socket exchange.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);
const ENTER_DELAY: Duration = Duration::from_millis(100);

const INSTALL_PATHS: &[&str] = &[
    "/Applications/kitty.app/Contents/MacOS/kitty",
    "/usr/local/bin/kitty",
];

/// Socket-controlled kitty adapter.
#[derive(Debug)]
pub struct Kitty {
    program: PathBuf,
    socket_dir: PathBuf,
    window: Option<WindowHandle>,
    child: Option<Child>,
}

impl Kitty {
    /// Locate the kitty executable and use the system temp dir for sockets.
    #[must_use]
    pub fn discover() -> Self {
        let user_install = dirs::home_dir().map(|home| home.join(".local/kitty.app/bin/kitty"));
        let program = INSTALL_PATHS
            .iter()
            .map(PathBuf::from)
            .chain(user_install)
            .find(|path| path.exists())
            .or_else(|| process::find_executable("kitty"))
            .unwrap_or_else(|| PathBuf::from("kitty"));
        Self::with_paths(program, std::env::temp_dir())
    }

    /// Use an explicit executable and socket directory.
    #[must_use]
    pub fn with_paths(program: impl Into<PathBuf>, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            socket_dir: socket_dir.into(),
            window: None,
            child: None,
        }
    }

    /// Control socket of the current window.
    #[must_use]
    pub fn socket_path(&self) -> Option<&Path> {
        self.window.as_ref()?.socket_path.as_deref()
    }

    async fn open(&mut self, request: &WindowRequest) -> Result<WindowHandle> {
        if self.window.is_some() {
            if let Err(err) = self.shutdown().await {
                debug!(%err, "previous kitty window did not close cleanly");
            }
        }

        let simple = uuid::Uuid::new_v4().simple().to_string();
        let id = simple[..8].to_owned();
        let socket = self.socket_dir.join(format!("kitty-conductor-{id}"));
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_owned());

        let mut child = Command::new(&self.program)
            .arg("--listen-on")
            .arg(format!("unix:{}", socket.display()))
            .arg("--directory")
            .arg(&request.working_dir)
            .args(["-o", "allow_remote_control=socket-only", "--title"])
            .arg(&request.title)
            .arg("-e")
            .arg(&shell)
            .arg("-c")
            .arg(launch_script(request, &shell))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Terminal(format!("failed to launch kitty: {err}")))?;

        let ready = deadline::bounded("kitty socket", SOCKET_WAIT, async {
            loop {
                if socket.exists() {
                    return Ok(());
                }
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(AppError::Terminal(format!(
                        "kitty exited before opening its socket: {status}"
                    )));
                }
                tokio::time::sleep(SOCKET_POLL).await;
            }
        })
        .await;

        if let Err(err) = ready {
            let _ = child.start_kill();
            return Err(AppError::Terminal(format!(
                "kitty socket {} never appeared: {err}",
                socket.display()
            )));
        }

        info!(task_id = %request.task_id, socket = %socket.display(), "kitty window created");
        let handle = WindowHandle {
            id,
            socket_path: Some(socket),
            window_id: None,
            pid: child.id(),
        };
        self.window = Some(handle.clone());
        self.child = Some(child);
        Ok(handle)
    }

    async fn deliver(&self, text: &str, press_enter: bool) -> Result<()> {
        let socket = self
            .socket_path()
            .ok_or_else(|| AppError::InvalidState("kitty adapter has no window".into()))?;

        request(socket, KittyCommand::send_text(text)).await?;
        if press_enter {
            tokio::time::sleep(ENTER_DELAY).await;
            request(socket, KittyCommand::send_key("enter")).await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.window.take() else {
            return Ok(());
        };
        let mut child = self.child.take();

        let outcome = match handle.socket_path.as_deref() {
            Some(socket) if socket.exists() => request(socket, KittyCommand::close_window())
                .await
                .map(|_| ()),
            _ => Ok(()),
        };

        if let Err(err) = &outcome {
            warn!(%err, "kitty close-window failed, terminating instance");
            if let Some(child) = child.as_mut() {
                terminate(child);
            }
        }

        if let Some(socket) = handle.socket_path.as_deref() {
            match tokio::fs::remove_file(socket).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(%err, socket = %socket.display(), "failed to remove kitty socket"),
            }
        }

        outcome
    }

    async fn probe(&self) -> ActivityProbe {
        let Some(socket) = self.socket_path() else {
            return ActivityProbe::Unsupported;
        };
        match request(socket, KittyCommand::ls()).await {
            Ok(Some(data)) => activity_from_ls(&data),
            Ok(None) => ActivityProbe::Unsupported,
            Err(err) => {
                debug!(%err, "kitty ls failed");
                ActivityProbe::Unsupported
            }
        }
    }
}

/// Shell line run inside the new window: exports, the command, then an
/// interactive shell so the window survives the worker exiting.
#[must_use]
pub fn launch_script(request: &WindowRequest, shell: &str) -> String {
    let mut parts: Vec<String> = request
        .env
        .iter()
        .map(|(key, value)| format!("export {key}={}", shell_quote(value)))
        .collect();
    parts.push(request.command.clone());
    parts.push(format!("exec {}", shell_quote(shell)));
    parts.join("; ")
}

async fn request(socket: &Path, command: KittyCommand) -> Result<Option<Value>> {
    let cmd = command.cmd;
    deadline::bounded(cmd, IO_TIMEOUT, exchange(socket, command)).await
}

async fn exchange(socket: &Path, command: KittyCommand) -> Result<Option<Value>> {
    let cmd = command.cmd;
    let name = socket.to_fs_name::<GenericFilePath>()?;
    let stream = Stream::connect(name)
        .await
        .map_err(|err| AppError::Terminal(format!("failed to connect to kitty: {err}")))?;
    let (reader, mut writer) = stream.split();

    let mut frame = BytesMut::new();
    KittyCodec::new().encode(command, &mut frame)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|err| AppError::Terminal(format!("kitty {cmd} write failed: {err}")))?;

    let mut responses = FramedRead::new(reader, KittyCodec::new());
    match responses.next().await {
        Some(response) => response?.into_result(cmd),
        None => Err(AppError::Terminal(format!(
            "kitty closed the socket before answering {cmd}"
        ))),
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id().map(i32::try_from) {
        Some(Ok(pid)) => {
            if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                debug!(%err, pid, "SIGTERM to kitty failed");
            }
        }
        _ => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

impl TerminalAdapter for Kitty {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Kitty
    }

    fn name(&self) -> &'static str {
        "Kitty"
    }

    fn is_available(&self) -> bool {
        self.program.is_file() || process::find_executable("kitty").is_some()
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
        self.child = None;
    }

    fn is_window_alive(&self) -> bool {
        self.socket_path().is_some_and(Path::exists)
    }

    fn is_agent_active(&self) -> BoxFuture<'_, ActivityProbe> {
        self.probe().boxed()
    }
}

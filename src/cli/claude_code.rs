//! Claude Code adapter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{AgentCli, CliKind};
use crate::models::cli_status::CliStatus;
use crate::process::{self, ShellDialect};

/// Deadline for `claude status`.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Context window assumed when the status output omits it.
pub const DEFAULT_MAX_TOKENS: u64 = 200_000;

/// Claude Code, started with permission prompts disabled.
#[derive(Debug, Clone)]
pub struct ClaudeCode {
    program: PathBuf,
}

#[derive(Debug, Deserialize)]
struct StatusReport {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    context_tokens: u64,
    #[serde(default = "default_max_tokens")]
    max_context_tokens: u64,
}

fn default_max_tokens() -> u64 {
    DEFAULT_MAX_TOKENS
}

impl ClaudeCode {
    /// Resolve the executable: the per-user install first, then `PATH`.
    #[must_use]
    pub fn discover() -> Self {
        let user_install = dirs::home_dir().map(|home| home.join(".claude").join("local").join("claude"));
        let program = match user_install {
            Some(path) if path.exists() => path,
            user_install => process::find_executable("claude")
                .or(user_install)
                .unwrap_or_else(|| PathBuf::from("claude")),
        };
        Self { program }
    }

    /// Use an explicit executable path.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolved executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn status(&self) -> CliStatus {
        let mut cmd = Command::new(&self.program);
        cmd.args(["status", "--format", "json"]);

        let output = match process::run_bounded(cmd, "claude status", STATUS_TIMEOUT).await {
            Ok(output) => output,
            Err(err) => {
                debug!(%err, "claude status unavailable");
                return CliStatus::not_running();
            }
        };
        if !output.status.success() {
            return CliStatus::not_running();
        }
        parse_status(&output.stdout)
    }
}

/// Parse `claude status --format json` output.
#[must_use]
pub fn parse_status(raw: &[u8]) -> CliStatus {
    match serde_json::from_slice::<StatusReport>(raw) {
        Ok(report) => CliStatus {
            is_running: true,
            session_id: report.session_id,
            tokens_used: report.context_tokens,
            tokens_max: report.max_context_tokens,
        },
        Err(err) => {
            warn!(%err, "unparseable claude status output");
            CliStatus::not_running()
        }
    }
}

impl AgentCli for ClaudeCode {
    fn kind(&self) -> CliKind {
        CliKind::ClaudeCode
    }

    fn name(&self) -> &'static str {
        "Claude Code"
    }

    fn start_command(&self, _working_dir: &Path, shell: ShellDialect) -> String {
        shell.command_line(
            &self.program.to_string_lossy(),
            &["--dangerously-skip-permissions"],
        )
    }

    fn clear_session_command(&self) -> Option<&'static str> {
        Some("/clear")
    }

    fn supports_status_query(&self) -> bool {
        true
    }

    fn supports_resume(&self) -> bool {
        false
    }

    fn query_status(&self) -> BoxFuture<'_, CliStatus> {
        self.status().boxed()
    }

    fn is_available(&self) -> bool {
        self.program.exists() || process::find_executable("claude").is_some()
    }
}

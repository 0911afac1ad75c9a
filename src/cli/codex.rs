//! `OpenAI` Codex CLI adapter.

use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};

use super::{AgentCli, CliKind};
use crate::models::cli_status::CliStatus;
use crate::process::{self, ShellDialect};

/// Context window reported for Codex, which has no status query.
pub const ASSUMED_MAX_TOKENS: u64 = 128_000;

/// Codex, started in full-auto mode.
#[derive(Debug, Clone)]
pub struct Codex {
    program: String,
}

impl Codex {
    /// Resolve `codex` from `PATH`, falling back to the bare name.
    #[must_use]
    pub fn discover() -> Self {
        let program = process::find_executable("codex")
            .map_or_else(|| "codex".to_owned(), |path| path.to_string_lossy().into_owned());
        Self { program }
    }

    /// Use an explicit executable path.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into().to_string_lossy().into_owned(),
        }
    }

    fn command(&self, shell: ShellDialect, args: &[&str]) -> String {
        shell.command_line(&self.program, args)
    }
}

impl AgentCli for Codex {
    fn kind(&self) -> CliKind {
        CliKind::Codex
    }

    fn name(&self) -> &'static str {
        "OpenAI Codex CLI"
    }

    fn start_command(&self, _working_dir: &Path, shell: ShellDialect) -> String {
        self.command(shell, &["--yolo"])
    }

    fn start_command_with_prompt(&self, prompt: &str, shell: ShellDialect) -> Option<String> {
        Some(self.command(shell, &["--yolo", prompt]))
    }

    fn clear_session_command(&self) -> Option<&'static str> {
        None
    }

    fn supports_status_query(&self) -> bool {
        false
    }

    fn supports_resume(&self) -> bool {
        true
    }

    fn resume_command(&self, shell: ShellDialect) -> Option<String> {
        Some(self.command(shell, &["resume", "--last"]))
    }

    fn query_status(&self) -> BoxFuture<'_, CliStatus> {
        async { CliStatus::assumed_running(ASSUMED_MAX_TOKENS) }.boxed()
    }

    fn is_available(&self) -> bool {
        process::find_executable("codex").is_some() || Path::new(&self.program).is_file()
    }
}

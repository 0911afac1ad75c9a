//! Google Gemini CLI adapter.

use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};

use super::{AgentCli, CliKind};
use crate::models::cli_status::CliStatus;
use crate::process::{self, ShellDialect};

/// Context window reported for Gemini, which has no status query.
pub const ASSUMED_MAX_TOKENS: u64 = 1_000_000;

/// Gemini, started in yolo mode.
#[derive(Debug, Clone)]
pub struct Gemini {
    program: String,
}

impl Gemini {
    /// Resolve `gemini` from `PATH`, falling back to the bare name.
    #[must_use]
    pub fn discover() -> Self {
        let program = process::find_executable("gemini")
            .map_or_else(|| "gemini".to_owned(), |path| path.to_string_lossy().into_owned());
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

impl AgentCli for Gemini {
    fn kind(&self) -> CliKind {
        CliKind::Gemini
    }

    fn name(&self) -> &'static str {
        "Google Gemini CLI"
    }

    fn start_command(&self, _working_dir: &Path, shell: ShellDialect) -> String {
        self.command(shell, &["-y"])
    }

    fn start_command_with_prompt(&self, prompt: &str, shell: ShellDialect) -> Option<String> {
        Some(self.command(shell, &["-y", "-p", prompt]))
    }

    fn clear_session_command(&self) -> Option<&'static str> {
        Some("/clear")
    }

    fn supports_status_query(&self) -> bool {
        false
    }

    fn supports_resume(&self) -> bool {
        true
    }

    fn resume_command(&self, shell: ShellDialect) -> Option<String> {
        Some(self.command(shell, &["--resume"]))
    }

    fn query_status(&self) -> BoxFuture<'_, CliStatus> {
        async { CliStatus::assumed_running(ASSUMED_MAX_TOKENS) }.boxed()
    }

    fn is_available(&self) -> bool {
        process::find_executable("gemini").is_some() || Path::new(&self.program).is_file()
    }
}

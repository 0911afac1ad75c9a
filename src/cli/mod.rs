//! Agent-CLI adapters.
//!
//! One implementation per supported coding-agent tool. Adapters only build
//! command lines and answer status queries; they never touch the terminal.

pub mod claude_code;
pub mod codex;
pub mod gemini;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use claude_code::ClaudeCode;
pub use codex::Codex;
pub use gemini::Gemini;

use crate::models::cli_status::CliStatus;
use crate::process::ShellDialect;
use crate::services::{ENV_CALLBACK_BASE, ENV_TASK_ID};
use crate::{AppError, Result};

/// Supported agent CLIs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CliKind {
    /// Anthropic Claude Code.
    ClaudeCode,
    /// `OpenAI` Codex CLI.
    Codex,
    /// Google Gemini CLI.
    Gemini,
}

impl CliKind {
    /// Every supported kind.
    pub const ALL: [Self; 3] = [Self::ClaudeCode, Self::Codex, Self::Gemini];

    /// Settings-store identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude_code",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for CliKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CliKind {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "claude_code" => Ok(Self::ClaudeCode),
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            other => Err(AppError::Unavailable(format!("unknown cli type '{other}'"))),
        }
    }
}

/// Uniform capability set over the supported agent CLIs.
pub trait AgentCli: Send + Sync {
    /// Variant discriminator.
    fn kind(&self) -> CliKind;

    /// Display name.
    fn name(&self) -> &'static str;

    /// Interactive start command for a worker rooted at `working_dir`,
    /// quoted for the shell the terminal runs it under.
    fn start_command(&self, working_dir: &Path, shell: ShellDialect) -> String;

    /// One-shot start command carrying the first prompt, for tools that accept one.
    fn start_command_with_prompt(&self, _prompt: &str, _shell: ShellDialect) -> Option<String> {
        None
    }

    /// Command that wipes the tool's conversation, if it has one.
    fn clear_session_command(&self) -> Option<&'static str>;

    /// Whether [`AgentCli::query_status`] reflects the live tool.
    fn supports_status_query(&self) -> bool;

    /// Whether the tool can resume its last conversation from the command line.
    fn supports_resume(&self) -> bool;

    /// Command that resumes the last conversation.
    fn resume_command(&self, _shell: ShellDialect) -> Option<String> {
        None
    }

    /// Query live status. Never fails: errors and timeouts report not running.
    fn query_status(&self) -> BoxFuture<'_, CliStatus>;

    /// Adjust an outgoing prompt for the tool's input conventions.
    fn format_prompt(&self, text: &str) -> String {
        text.to_owned()
    }

    /// Whether the executable can be found on this host.
    fn is_available(&self) -> bool;

    /// Environment injected into the worker so it can report back.
    fn env_vars(&self, task_id: &str, callback_base: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if !task_id.is_empty() {
            env.insert(ENV_TASK_ID.to_owned(), task_id.to_owned());
        }
        if !callback_base.is_empty() {
            env.insert(ENV_CALLBACK_BASE.to_owned(), callback_base.to_owned());
        }
        env
    }
}

/// Build the adapter for `kind`, failing closed when the tool is missing.
///
/// # Errors
///
/// Returns `AppError::Unavailable` if the executable cannot be found.
pub fn cli_for(kind: CliKind) -> Result<Arc<dyn AgentCli>> {
    let cli = build(kind);
    if cli.is_available() {
        Ok(cli)
    } else {
        Err(AppError::Unavailable(format!("{} is not installed", cli.name())))
    }
}

/// Build the adapter for a settings-store identifier.
///
/// # Errors
///
/// Returns `AppError::Unavailable` for unknown identifiers or missing tools.
pub fn cli_from_name(name: &str) -> Result<Arc<dyn AgentCli>> {
    cli_for(name.parse()?)
}

fn build(kind: CliKind) -> Arc<dyn AgentCli> {
    match kind {
        CliKind::ClaudeCode => Arc::new(ClaudeCode::discover()),
        CliKind::Codex => Arc::new(Codex::discover()),
        CliKind::Gemini => Arc::new(Gemini::discover()),
    }
}

/// Capability summary for one agent CLI on this host.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CliInfo {
    /// Variant.
    pub kind: CliKind,
    /// Display name.
    pub name: &'static str,
    /// Whether the executable was found.
    pub available: bool,
    /// Whether live status queries work.
    pub supports_status_query: bool,
    /// Whether command-line resume works.
    pub supports_resume: bool,
}

/// Describe every supported agent CLI, installed or not.
#[must_use]
pub fn available_cli_kinds() -> Vec<CliInfo> {
    CliKind::ALL
        .into_iter()
        .map(|kind| {
            let cli = build(kind);
            CliInfo {
                kind,
                name: cli.name(),
                available: cli.is_available(),
                supports_status_query: cli.supports_status_query(),
                supports_resume: cli.supports_resume(),
            }
        })
        .collect()
}

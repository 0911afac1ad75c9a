//! Contracts for the collaborators the orchestration core calls out to.
//!
//! Persistence, template content and the HTTP surface live outside this
//! crate. The session manager and watchdog only see these narrow traits,
//! which keeps them testable with in-memory fakes.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Template rendered for the first prompt of a fresh session.
pub const TEMPLATE_INITIAL: &str = "initial_task";
/// Template sent after a manual restart or when recovering an in-progress task.
pub const TEMPLATE_RESUME: &str = "resume_task";
/// Template used to nudge an idle worker and as the recovery fallback.
pub const TEMPLATE_CONTINUE: &str = "continue_task";
/// Template used to recover a task that is under review.
pub const TEMPLATE_REVIEW: &str = "review";

/// Business status of a task that is being worked on.
pub const TASK_STATUS_IN_PROGRESS: &str = "in_progress";
/// Business status of a task that is being reviewed.
pub const TASK_STATUS_IN_REVIEW: &str = "in_reviewing";

/// Environment variable carrying the task identifier into the worker.
pub const ENV_TASK_ID: &str = "CODEX_TASK_ID";
/// Environment variable carrying the callback base address into the worker.
pub const ENV_CALLBACK_BASE: &str = "CODEX_API_BASE_URL";

/// Reason reported to the [`RecoveryNotifier`] for a dead worker.
pub const REASON_TERMINATED: &str = "terminated";

/// Read access to user-facing settings.
pub trait SettingsReader: Send + Sync {
    /// Configured terminal emulator (`auto`, `kitty`, `iterm`, `windows_terminal`).
    ///
    /// # Errors
    ///
    /// Implementations return an error if the settings store is unreachable.
    fn terminal_type(&self) -> BoxFuture<'_, Result<String>>;

    /// Configured default agent CLI (`claude_code`, `codex`, `gemini`).
    ///
    /// # Errors
    ///
    /// Implementations return an error if the settings store is unreachable.
    fn cli_type(&self) -> BoxFuture<'_, Result<String>>;

    /// Locale used for template rendering.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the settings store is unreachable.
    fn language(&self) -> BoxFuture<'_, Result<String>>;
}

/// Named fields substituted into prompt templates.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateFields {
    /// Task identifier.
    pub task_id: String,
    /// Worker working directory.
    pub project_dir: String,
    /// Path of the task document.
    pub doc_path: String,
    /// Callback base address.
    pub callback_base: String,
}

/// Renders prompt templates. Must be idempotent and side-effect free.
pub trait TemplateRenderer: Send + Sync {
    /// Render `template` for `locale` with the given fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Template` when the template is unknown or fails to render.
    fn render<'a>(
        &'a self,
        template: &'a str,
        locale: &'a str,
        fields: &'a TemplateFields,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Raw task row as stored by the surrounding system.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    /// Business status (`pending`, `in_progress`, `in_reviewing`, ...).
    pub status: String,
    /// Remaining columns, untouched by the core.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Looks up the current business status of a task.
pub trait TaskStatusReader: Send + Sync {
    /// Fetch the raw task record, `None` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the task store is unreachable.
    fn raw_task<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<Option<TaskRecord>>>;
}

/// Upstream observer told about sessions the watchdog is about to recover.
pub trait RecoveryNotifier: Send + Sync {
    /// Best-effort notification; errors are logged and swallowed by the caller.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the watchdog never propagates the error.
    fn notify<'a>(&'a self, task_id: &'a str, reason: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Map a task business status to the template used to recover its worker.
#[must_use]
pub fn recovery_template_for(status: Option<&str>) -> &'static str {
    match status {
        Some(TASK_STATUS_IN_PROGRESS) => TEMPLATE_RESUME,
        Some(TASK_STATUS_IN_REVIEW) => TEMPLATE_REVIEW,
        _ => TEMPLATE_CONTINUE,
    }
}

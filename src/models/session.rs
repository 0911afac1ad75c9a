//! Session status, configuration and read-only snapshot types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cli_status::CliStatus;
use crate::cli::CliKind;

/// Lifecycle status for a managed session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Registered but never started.
    Idle,
    /// Window is being opened and the first prompt delivered.
    Starting,
    /// Worker is up and has its prompt.
    Running,
    /// Orderly shutdown in progress.
    Stopping,
    /// Shut down, or found dead.
    Stopped,
    /// A lifecycle step failed.
    Error,
}

impl SessionStatus {
    /// `Starting` or `Running`.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// `Stopped` or `Error`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Idle | Self::Stopped | Self::Error,
                Self::Starting
            ) | (Self::Starting, Self::Running)
                | (
                    Self::Starting | Self::Running,
                    Self::Error | Self::Stopped
                )
                | (
                    Self::Idle | Self::Starting | Self::Running,
                    Self::Stopping
                )
                | (Self::Stopping, Self::Stopped | Self::Error)
        )
    }

    /// Lowercase label used in logs and snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// Mutable routing configuration captured per session.
///
/// Refreshed by every start request so a restart picks up changed values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Worker working directory.
    pub working_dir: PathBuf,
    /// Task document handed to the worker through the prompt.
    pub doc_path: String,
    /// Agent CLI driving the worker.
    pub cli_kind: CliKind,
    /// Base address the worker reports back to.
    pub callback_base: String,
}

/// Serializable, point-in-time view of a session for API responses.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionSnapshot {
    /// Task identifier.
    pub task_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Routing configuration.
    #[serde(flatten)]
    pub config: SessionConfig,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Last stop or failure timestamp.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Last failure message.
    pub error_message: Option<String>,
    /// Whether the session holds a concurrency slot.
    pub holds_slot: bool,
    /// Terminal adapter display name.
    pub terminal_name: String,
    /// Agent CLI display name.
    pub cli_name: String,
    /// Most recent CLI status, for tools that support status queries.
    pub cli_status: Option<CliStatus>,
}

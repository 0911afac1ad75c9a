//! Live status reported by an agent CLI.

use serde::{Deserialize, Serialize};

/// Snapshot of an agent CLI's own view of its session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CliStatus {
    /// Whether the CLI reports a live session.
    pub is_running: bool,
    /// CLI-side session identifier, when the tool exposes one.
    pub session_id: Option<String>,
    /// Context tokens consumed so far.
    pub tokens_used: u64,
    /// Context window size.
    pub tokens_max: u64,
}

impl CliStatus {
    /// Status returned by tools that cannot be queried: assumed running.
    #[must_use]
    pub fn assumed_running(tokens_max: u64) -> Self {
        Self {
            is_running: true,
            session_id: None,
            tokens_used: 0,
            tokens_max,
        }
    }

    /// Status returned when a query failed or timed out.
    #[must_use]
    pub fn not_running() -> Self {
        Self::default()
    }

    /// Fraction of the context window in use, `0.0` when the window size is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // token counts stay far below 2^52
    pub fn context_usage(&self) -> f64 {
        if self.tokens_max == 0 {
            0.0
        } else {
            self.tokens_used as f64 / self.tokens_max as f64
        }
    }
}

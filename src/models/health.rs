//! Health classification vocabulary shared by terminals and the watchdog.

use serde::{Deserialize, Serialize};

/// Result of a terminal's native "is the agent computing" probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityProbe {
    /// The driven program is busy.
    Active,
    /// The driven program is waiting at a prompt.
    Idle,
    /// The driven program has exited and the window is back at a bare shell.
    Exited,
    /// The terminal cannot answer; callers fall back to other signals.
    Unsupported,
}

/// Watchdog verdict for one active session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Nothing to do.
    Healthy,
    /// Worker is alive but not working; gets a nudge.
    Idle,
    /// Worker window is gone; session gets restarted.
    Terminated,
}

//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Deserialize;

use crate::services::SettingsReader;
use crate::{AppError, Result};

/// Upper bound accepted for `max_concurrent_sessions`.
pub const MAX_CONCURRENT_LIMIT: usize = 10;

/// Bounded-wait values for every blocking orchestration step.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Registry and per-session lifecycle lock acquisition.
    #[serde(default = "default_lock_seconds")]
    pub lock_seconds: u64,
    /// Concurrency slot acquisition.
    #[serde(default = "default_slot_seconds")]
    pub slot_seconds: u64,
    /// Window creation and text delivery.
    #[serde(default = "default_terminal_seconds")]
    pub terminal_seconds: u64,
    /// Window close and background task teardown.
    #[serde(default = "default_cleanup_seconds")]
    pub cleanup_seconds: u64,
    /// Settings lookup and template rendering.
    #[serde(default = "default_render_seconds")]
    pub render_seconds: u64,
    /// Pause after the window opens so the agent CLI can finish booting.
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
    /// Pause after the clear-session command before the prompt is sent.
    #[serde(default = "default_clear_settle_millis")]
    pub clear_settle_millis: u64,
}

fn default_lock_seconds() -> u64 {
    10
}

fn default_slot_seconds() -> u64 {
    30
}

fn default_terminal_seconds() -> u64 {
    15
}

fn default_cleanup_seconds() -> u64 {
    5
}

fn default_render_seconds() -> u64 {
    10
}

fn default_settle_millis() -> u64 {
    1500
}

fn default_clear_settle_millis() -> u64 {
    500
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            lock_seconds: default_lock_seconds(),
            slot_seconds: default_slot_seconds(),
            terminal_seconds: default_terminal_seconds(),
            cleanup_seconds: default_cleanup_seconds(),
            render_seconds: default_render_seconds(),
            settle_millis: default_settle_millis(),
            clear_settle_millis: default_clear_settle_millis(),
        }
    }
}

impl TimeoutConfig {
    /// Registry / lifecycle lock wait.
    #[must_use]
    pub fn lock(&self) -> Duration {
        Duration::from_secs(self.lock_seconds)
    }

    /// Slot acquisition wait.
    #[must_use]
    pub fn slot(&self) -> Duration {
        Duration::from_secs(self.slot_seconds)
    }

    /// Window create / send deadline.
    #[must_use]
    pub fn terminal(&self) -> Duration {
        Duration::from_secs(self.terminal_seconds)
    }

    /// Close / teardown deadline.
    #[must_use]
    pub fn cleanup(&self) -> Duration {
        Duration::from_secs(self.cleanup_seconds)
    }

    /// Settings + render deadline.
    #[must_use]
    pub fn render(&self) -> Duration {
        Duration::from_secs(self.render_seconds)
    }

    /// Post-launch settle delay.
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }

    /// Post-clear settle delay.
    #[must_use]
    pub fn clear_settle(&self) -> Duration {
        Duration::from_millis(self.clear_settle_millis)
    }
}

/// Health watchdog configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchdogConfig {
    /// Whether the watchdog loop should be started by the embedding process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between health checks.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// Seconds without recorded activity before a probe-less session counts as idle.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
    /// Use the activity ledger as an idle signal when the terminal has no native probe.
    #[serde(default)]
    pub heartbeat_fallback: bool,
    /// Pause after a failed tick before the loop resumes.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_seconds: u64,
    /// Interval for polling agent CLI status; 0 disables polling.
    #[serde(default = "default_status_poll")]
    pub status_poll_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_check_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    300
}

fn default_error_backoff() -> u64 {
    60
}

fn default_status_poll() -> u64 {
    60
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: default_check_interval(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
            heartbeat_fallback: false,
            error_backoff_seconds: default_error_backoff(),
            status_poll_seconds: default_status_poll(),
        }
    }
}

impl WatchdogConfig {
    /// Tick interval.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Heartbeat timeout for the ledger-based idle fallback.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    /// Backoff after a failed tick.
    #[must_use]
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_seconds)
    }

    /// Status poll interval, `None` when disabled.
    #[must_use]
    pub fn status_poll(&self) -> Option<Duration> {
        (self.status_poll_seconds > 0).then(|| Duration::from_secs(self.status_poll_seconds))
    }
}

fn default_terminal() -> String {
    "auto".into()
}

fn default_cli() -> String {
    "claude_code".into()
}

fn default_language() -> String {
    "zh".into()
}

fn default_max_concurrent_sessions() -> usize {
    3
}

fn default_callback_base() -> String {
    "http://127.0.0.1:8086".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Terminal emulator: `auto`, `kitty`, `iterm` or `windows_terminal`.
    #[serde(default = "default_terminal")]
    pub terminal: String,
    /// Default agent CLI: `claude_code`, `codex` or `gemini`.
    #[serde(default = "default_cli")]
    pub default_cli: String,
    /// Locale handed to the template renderer.
    #[serde(default = "default_language")]
    pub language: String,
    /// Size of the concurrency slot pool.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    /// Base address workers use to report status back.
    #[serde(default = "default_callback_base")]
    pub callback_base: String,
    /// Bounded-wait values.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Watchdog settings.
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            terminal: default_terminal(),
            default_cli: default_cli(),
            language: default_language(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
            callback_base: default_callback_base(),
            timeouts: TimeoutConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        validate_max_concurrent(self.max_concurrent_sessions)?;

        if self.callback_base.trim().is_empty() {
            return Err(AppError::Config("callback_base must not be empty".into()));
        }

        if self.watchdog.check_interval_seconds == 0 {
            return Err(AppError::Config(
                "watchdog.check_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.watchdog.heartbeat_fallback && self.watchdog.heartbeat_timeout_seconds == 0 {
            return Err(AppError::Config(
                "watchdog.heartbeat_timeout_seconds must be greater than zero when heartbeat_fallback is on"
                    .into(),
            ));
        }

        for (name, value) in [
            ("lock_seconds", self.timeouts.lock_seconds),
            ("slot_seconds", self.timeouts.slot_seconds),
            ("terminal_seconds", self.timeouts.terminal_seconds),
            ("cleanup_seconds", self.timeouts.cleanup_seconds),
            ("render_seconds", self.timeouts.render_seconds),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!(
                    "timeouts.{name} must be greater than zero"
                )));
            }
        }

        Ok(())
    }
}

/// Validate a concurrency limit against the accepted range.
///
/// # Errors
///
/// Returns `AppError::Config` when `value` is outside `1..=MAX_CONCURRENT_LIMIT`.
pub fn validate_max_concurrent(value: usize) -> Result<()> {
    if (1..=MAX_CONCURRENT_LIMIT).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "max_concurrent_sessions must be between 1 and {MAX_CONCURRENT_LIMIT}, got {value}"
        )))
    }
}

impl SettingsReader for GlobalConfig {
    fn terminal_type(&self) -> BoxFuture<'_, Result<String>> {
        let value = self.terminal.clone();
        async move { Ok(value) }.boxed()
    }

    fn cli_type(&self) -> BoxFuture<'_, Result<String>> {
        let value = self.default_cli.clone();
        async move { Ok(value) }.boxed()
    }

    fn language(&self) -> BoxFuture<'_, Result<String>> {
        let value = self.language.clone();
        async move { Ok(value) }.boxed()
    }
}

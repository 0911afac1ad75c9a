//! Error types shared across the orchestration core.

use std::fmt::{Display, Formatter};

/// Shared result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every session orchestration failure mode.
///
/// None of these escape as panics: the session manager turns each of them
/// into a failed operation or a session state transition.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Agent CLI or terminal emulator is not installed, or the type is unknown.
    Unavailable(String),
    /// Concurrency slot pool is saturated.
    Capacity(String),
    /// A bounded operation exceeded its deadline.
    Timeout(String),
    /// Window creation, text delivery or window close failed.
    Terminal(String),
    /// Agent CLI status query failure.
    Cli(String),
    /// Template rendering failure reported by the renderer.
    Template(String),
    /// Requested session does not exist.
    NotFound(String),
    /// Operation is not permitted in the session's current state.
    InvalidState(String),
    /// An in-flight operation was cancelled by a concurrent stop.
    Cancelled(String),
    /// File-system or process I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            Self::Capacity(msg) => write!(f, "capacity: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Terminal(msg) => write!(f, "terminal: {msg}"),
            Self::Cli(msg) => write!(f, "cli: {msg}"),
            Self::Template(msg) => write!(f, "template: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("json: {err}"))
    }
}

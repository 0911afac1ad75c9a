//! Deadline and cancellation wrappers for blocking orchestration steps.
//!
//! Every wait the session manager performs goes through one of these so a
//! stuck terminal or renderer surfaces as `AppError::Timeout` on that call
//! and never wedges the manager.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{AppError, Result};

/// Await an infallible future for at most `limit`.
///
/// # Errors
///
/// Returns `AppError::Timeout` naming `label` when the deadline elapses.
pub async fn within<T, F>(label: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_elapsed| AppError::Timeout(format!("{label} exceeded {limit:?}")))
}

/// Await a fallible future for at most `limit`, flattening its result.
///
/// # Errors
///
/// Returns the future's own error, or `AppError::Timeout` on expiry.
pub async fn bounded<T, F>(label: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    within(label, limit, fut).await?
}

/// Like [`bounded`], but also abort when `cancel` fires.
///
/// # Errors
///
/// Returns `AppError::Cancelled` if the token is cancelled first.
pub async fn guarded<T, F>(
    label: &str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AppError::Cancelled(format!("{label} cancelled"))),
        result = bounded(label, limit, fut) => result,
    }
}

/// Sleep for `pause` unless `cancel` fires first.
///
/// # Errors
///
/// Returns `AppError::Cancelled` when interrupted.
pub async fn pause(label: &str, pause: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AppError::Cancelled(format!("{label} cancelled"))),
        () = tokio::time::sleep(pause) => Ok(()),
    }
}

//! Clipboard save, paste and restore for the focus-driven terminals.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};

use crate::{AppError, Result};

#[cfg(any(target_os = "macos", target_os = "windows"))]
mod native {
    use arboard::Clipboard;

    use crate::{AppError, Result};

    fn open() -> Result<Clipboard> {
        Clipboard::new().map_err(|err| AppError::Terminal(format!("failed to access clipboard: {err}")))
    }

    pub fn read() -> Result<Option<String>> {
        match open()?.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(AppError::Terminal(format!("failed to read clipboard: {err}"))),
        }
    }

    pub fn write(text: String) -> Result<()> {
        open()?
            .set_text(text)
            .map_err(|err| AppError::Terminal(format!("failed to write clipboard: {err}")))
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
mod native {
    use crate::{AppError, Result};

    pub fn read() -> Result<Option<String>> {
        Err(AppError::Unavailable("no clipboard on this platform".into()))
    }

    pub fn write(_text: String) -> Result<()> {
        Err(AppError::Unavailable("no clipboard on this platform".into()))
    }
}

/// Text clipboard the paste-driven terminals write through.
pub trait ClipboardStore: Send + Sync + 'static {
    /// Current text, `None` when the clipboard holds no text.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be read.
    fn read(&self) -> Result<Option<String>>;

    /// Replace the clipboard contents with `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be written.
    fn write(&self, text: String) -> Result<()>;
}

/// The desktop clipboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardStore for SystemClipboard {
    fn read(&self) -> Result<Option<String>> {
        native::read()
    }

    fn write(&self, text: String) -> Result<()> {
        native::write(text)
    }
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| AppError::Terminal(format!("clipboard task failed: {err}")))?
}

/// [`paste_with_restore_on`] against the desktop clipboard.
///
/// # Errors
///
/// See [`paste_with_restore_on`].
pub async fn paste_with_restore<F>(text: String, paste: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    paste_with_restore_on(Arc::new(SystemClipboard), text, paste).await
}

/// Put `text` on the clipboard, run `paste`, then put the previous
/// clipboard text back whether or not `paste` succeeded.
///
/// The sequence runs as its own task. Dropping the returned future abandons
/// the paste but the task still restores the clipboard before it ends.
///
/// # Errors
///
/// Returns the error from writing `text` or from `paste`. Failing to read or
/// restore the previous contents is only logged.
pub async fn paste_with_restore_on<F>(store: Arc<dyn ClipboardStore>, text: String, paste: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let abandoned = CancellationToken::new();
    let _abandon_on_drop = abandoned.clone().drop_guard();

    let task = tokio::spawn(
        async move {
            let saved = {
                let store = Arc::clone(&store);
                match blocking(move || store.read()).await {
                    Ok(saved) => saved,
                    Err(err) => {
                        warn!(%err, "could not save clipboard before paste");
                        None
                    }
                }
            };

            {
                let store = Arc::clone(&store);
                blocking(move || store.write(text)).await?;
            }

            let outcome = tokio::select! {
                outcome = paste => outcome,
                () = abandoned.cancelled() => Err(AppError::Cancelled("paste abandoned".into())),
            };

            if let Some(previous) = saved {
                if let Err(err) = blocking(move || store.write(previous)).await {
                    warn!(%err, "failed to restore clipboard");
                }
            }

            outcome
        }
        .in_current_span(),
    );

    task.await
        .map_err(|err| AppError::Terminal(format!("clipboard task failed: {err}")))?
}

//! Managed session: one worker, its two adapters and its state machine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::slots::SlotPermit;
use crate::cli::{AgentCli, CliKind};
use crate::models::cli_status::CliStatus;
use crate::models::session::{SessionConfig, SessionSnapshot, SessionStatus};
use crate::terminal::{TerminalAdapter, TerminalKind};

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    slot: Option<SlotPermit>,
    cli_status: Option<CliStatus>,
}

#[derive(Debug, Default)]
struct RunControl {
    cancel: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

/// One worker under orchestration.
///
/// Identity is the task id. The terminal adapter is owned exclusively and
/// guarded by an async mutex because every terminal call awaits; the CLI
/// adapter can be swapped in place when a restart asks for a different tool.
/// Lifecycle operations on the same session are serialized by
/// [`ManagedSession::lifecycle`].
pub struct ManagedSession {
    task_id: String,
    terminal_name: &'static str,
    terminal_kind: TerminalKind,
    state: Mutex<SessionState>,
    terminal: tokio::sync::Mutex<Box<dyn TerminalAdapter>>,
    cli: RwLock<Arc<dyn AgentCli>>,
    lifecycle: tokio::sync::Mutex<()>,
    run: Mutex<RunControl>,
}

impl std::fmt::Debug for ManagedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedSession")
            .field("task_id", &self.task_id)
            .field("status", &self.status())
            .field("terminal", &self.terminal_name)
            .finish_non_exhaustive()
    }
}

impl ManagedSession {
    /// New session in `Idle`.
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        config: SessionConfig,
        terminal: Box<dyn TerminalAdapter>,
        cli: Arc<dyn AgentCli>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            terminal_name: terminal.name(),
            terminal_kind: terminal.kind(),
            state: Mutex::new(SessionState {
                status: SessionStatus::Idle,
                config,
                created_at: Utc::now(),
                started_at: None,
                stopped_at: None,
                last_error: None,
                slot: None,
                cli_status: None,
            }),
            terminal: tokio::sync::Mutex::new(terminal),
            cli: RwLock::new(cli),
            lifecycle: tokio::sync::Mutex::new(()),
            run: Mutex::new(RunControl::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) -> MutexGuard<'_, RunControl> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Task identifier.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    /// `Starting` or `Running`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// `Stopped` or `Error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Whether a concurrency slot is held.
    #[must_use]
    pub fn holds_slot(&self) -> bool {
        self.state().slot.is_some()
    }

    /// Copy of the routing configuration.
    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.state().config.clone()
    }

    /// Last failure message.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Most recent CLI status sample.
    #[must_use]
    pub fn cli_status(&self) -> Option<CliStatus> {
        self.state().cli_status.clone()
    }

    /// Current CLI adapter.
    #[must_use]
    pub fn cli(&self) -> Arc<dyn AgentCli> {
        Arc::clone(&self.cli.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Terminal adapter display name.
    #[must_use]
    pub fn terminal_name(&self) -> &'static str {
        self.terminal_name
    }

    /// Terminal variant hosting the worker.
    #[must_use]
    pub fn terminal_kind(&self) -> TerminalKind {
        self.terminal_kind
    }

    /// Exclusive access to the terminal adapter.
    pub fn terminal(&self) -> &tokio::sync::Mutex<Box<dyn TerminalAdapter>> {
        &self.terminal
    }

    /// Lock serializing start, stop and remove on this session.
    pub fn lifecycle(&self) -> &tokio::sync::Mutex<()> {
        &self.lifecycle
    }

    /// Whether a lifecycle operation is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lifecycle.try_lock().is_err()
    }

    /// Point-in-time view for API responses.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let cli_name = self.cli().name().to_owned();
        let state = self.state();
        SessionSnapshot {
            task_id: self.task_id.clone(),
            status: state.status,
            config: state.config.clone(),
            created_at: state.created_at,
            started_at: state.started_at,
            stopped_at: state.stopped_at,
            error_message: state.last_error.clone(),
            holds_slot: state.slot.is_some(),
            terminal_name: self.terminal_name.to_owned(),
            cli_name,
            cli_status: state.cli_status.clone(),
        }
    }

    // ── Liveness ────────────────────────────────────────────────

    /// Whether the session claims to be active and its window still exists.
    /// Never changes state.
    pub async fn probe_alive(&self) -> bool {
        self.is_active() && self.terminal.lock().await.is_window_alive()
    }

    /// Reconcile the claimed state with the terminal.
    ///
    /// Returns `true` only for an active session whose window exists. An
    /// active session whose window is gone is a ghost: it is demoted to
    /// `Stopped`, its slot is released and the adapter forgets the window.
    /// This is the only place ghosts are detected.
    pub async fn verify_alive(&self) -> bool {
        if !self.is_active() {
            return false;
        }

        let mut terminal = self.terminal.lock().await;
        if terminal.is_window_alive() {
            return true;
        }

        warn!(task_id = %self.task_id, "ghost session detected, window is gone");
        terminal.clear_window();
        drop(terminal);
        self.cancel_run();
        self.mark_stopped();
        false
    }

    // ── Transitions (manager only) ──────────────────────────────

    fn transition(&self, next: SessionStatus, apply: impl FnOnce(&mut SessionState)) {
        let mut state = self.state();
        if !state.status.can_transition_to(next) {
            debug!(
                task_id = %self.task_id,
                from = state.status.as_str(),
                to = next.as_str(),
                "unusual session transition"
            );
        }
        state.status = next;
        apply(&mut state);
    }

    pub(crate) fn mark_starting(&self, slot: Option<SlotPermit>) {
        self.transition(SessionStatus::Starting, |state| {
            state.started_at = Some(Utc::now());
            state.stopped_at = None;
            state.last_error = None;
            state.cli_status = None;
            if slot.is_some() {
                state.slot = slot;
            }
        });
    }

    pub(crate) fn mark_running(&self) {
        self.transition(SessionStatus::Running, |_| {});
    }

    pub(crate) fn mark_stopping(&self) {
        self.transition(SessionStatus::Stopping, |_| {});
    }

    pub(crate) fn mark_stopped(&self) {
        let slot = {
            let mut released = None;
            self.transition(SessionStatus::Stopped, |state| {
                state.stopped_at = Some(Utc::now());
                released = state.slot.take();
            });
            released
        };
        drop(slot);
    }

    pub(crate) fn mark_error(&self, message: impl Into<String>) {
        let message = message.into();
        let slot = {
            let mut released = None;
            self.transition(SessionStatus::Error, |state| {
                state.stopped_at = Some(Utc::now());
                state.last_error = Some(message);
                released = state.slot.take();
            });
            released
        };
        drop(slot);
    }

    /// Give back the slot, returning whether one was held.
    pub(crate) fn release_slot(&self) -> bool {
        let slot = self.state().slot.take();
        slot.is_some()
    }

    pub(crate) fn update_config(&self, apply: impl FnOnce(&mut SessionConfig)) {
        apply(&mut self.state().config);
    }

    pub(crate) fn swap_cli(&self, cli: Arc<dyn AgentCli>) -> CliKind {
        let kind = cli.kind();
        *self.cli.write().unwrap_or_else(PoisonError::into_inner) = cli;
        self.update_config(|config| config.cli_kind = kind);
        kind
    }

    pub(crate) fn record_cli_status(&self, status: CliStatus) {
        self.state().cli_status = Some(status);
    }

    // ── Background run control ──────────────────────────────────

    /// Fresh cancellation token for a new run.
    pub(crate) fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        self.run().cancel = token.clone();
        token
    }

    /// Token of the current run.
    pub(crate) fn run_token(&self) -> CancellationToken {
        self.run().cancel.clone()
    }

    /// Cancel the in-flight start and the status monitor, if any.
    pub(crate) fn cancel_run(&self) {
        self.run().cancel.cancel();
    }

    pub(crate) fn set_monitor(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.run().monitor.replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn take_monitor(&self) -> Option<JoinHandle<()>> {
        self.run().monitor.take()
    }
}

//! Session registry and lifecycle: create, start, stop, remove, restart.
//!
//! The manager is the only entry point for lifecycle changes. It owns the
//! registry of sessions and the concurrency slot pool; every wait it
//! performs is bounded so a stuck terminal or renderer shows up as a failed
//! call instead of a wedged manager.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::deadline::{self, bounded, guarded, within};
use super::ledger::ActivityLedger;
use super::session::ManagedSession;
use super::slots::SlotPool;
use super::status_monitor;
use crate::cli::{self, AgentCli, CliKind};
use crate::config::{validate_max_concurrent, GlobalConfig};
use crate::models::session::{SessionConfig, SessionSnapshot};
use crate::services::{SettingsReader, TemplateFields, TemplateRenderer, TEMPLATE_INITIAL, TEMPLATE_RESUME};
use crate::terminal::{self, TerminalAdapter, WindowRequest};
use crate::{AppError, Result};

/// Builds fresh adapter instances for new sessions.
pub trait AdapterFactory: Send + Sync {
    /// Terminal adapter for a settings value (`auto`, `kitty`, ...).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unavailable` for unknown or missing terminals.
    fn terminal(&self, kind: &str) -> Result<Box<dyn TerminalAdapter>>;

    /// Agent CLI adapter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unavailable` when the tool is missing.
    fn cli(&self, kind: CliKind) -> Result<Arc<dyn AgentCli>>;
}

/// Factory backed by the real emulators and tools on this host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAdapters;

impl AdapterFactory for SystemAdapters {
    fn terminal(&self, kind: &str) -> Result<Box<dyn TerminalAdapter>> {
        terminal::terminal_from_name(kind)
    }

    fn cli(&self, kind: CliKind) -> Result<Arc<dyn AgentCli>> {
        cli::cli_for(kind)
    }
}

/// Parameters of a start request. Unset fields keep the session's values;
/// `working_dir` and `doc_path` are required when the session is new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Task identifier.
    pub task_id: String,
    /// Worker working directory.
    pub working_dir: Option<PathBuf>,
    /// Task document path.
    pub doc_path: Option<String>,
    /// Agent CLI; falls back to the configured default for new sessions.
    pub cli_kind: Option<CliKind>,
    /// Callback base address; falls back to the configured default.
    pub callback_base: Option<String>,
    /// Template rendered into the first prompt.
    pub template: String,
}

impl StartRequest {
    /// Request for `task_id` using the initial-task template.
    #[must_use]
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            working_dir: None,
            doc_path: None,
            cli_kind: None,
            callback_base: None,
            template: TEMPLATE_INITIAL.to_owned(),
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the task document.
    #[must_use]
    pub fn doc_path(mut self, path: impl Into<String>) -> Self {
        self.doc_path = Some(path.into());
        self
    }

    /// Select the agent CLI.
    #[must_use]
    pub fn cli(mut self, kind: CliKind) -> Self {
        self.cli_kind = Some(kind);
        self
    }

    /// Set the callback base address.
    #[must_use]
    pub fn callback_base(mut self, base: impl Into<String>) -> Self {
        self.callback_base = Some(base.into());
        self
    }

    /// Use a different first-prompt template.
    #[must_use]
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

type Registry = HashMap<String, Arc<ManagedSession>>;

/// Owner of all sessions and of the concurrency limit.
pub struct SessionManager {
    config: GlobalConfig,
    settings: Arc<dyn SettingsReader>,
    renderer: Arc<dyn TemplateRenderer>,
    factory: Arc<dyn AdapterFactory>,
    registry: Mutex<Registry>,
    slots: SlotPool,
    ledger: Arc<ActivityLedger>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("max_concurrent", &self.slots.limit())
            .field("available_slots", &self.slots.available())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Manager using the host's real terminals and agent CLIs.
    #[must_use]
    pub fn new(
        config: GlobalConfig,
        settings: Arc<dyn SettingsReader>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self::with_factory(config, settings, renderer, Arc::new(SystemAdapters))
    }

    /// Manager whose settings come from `config` itself.
    #[must_use]
    pub fn from_config(config: GlobalConfig, renderer: Arc<dyn TemplateRenderer>) -> Self {
        let settings: Arc<dyn SettingsReader> = Arc::new(config.clone());
        Self::new(config, settings, renderer)
    }

    /// Manager with an explicit adapter factory.
    #[must_use]
    pub fn with_factory(
        config: GlobalConfig,
        settings: Arc<dyn SettingsReader>,
        renderer: Arc<dyn TemplateRenderer>,
        factory: Arc<dyn AdapterFactory>,
    ) -> Self {
        let slots = SlotPool::new(config.max_concurrent_sessions);
        Self {
            config,
            settings,
            renderer,
            factory,
            registry: Mutex::new(HashMap::new()),
            slots,
            ledger: Arc::new(ActivityLedger::new()),
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Configuration the manager was built with.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Settings reader.
    #[must_use]
    pub fn settings(&self) -> &Arc<dyn SettingsReader> {
        &self.settings
    }

    /// Template renderer.
    #[must_use]
    pub fn renderer(&self) -> &Arc<dyn TemplateRenderer> {
        &self.renderer
    }

    /// Activity ledger shared with the watchdog.
    #[must_use]
    pub fn ledger(&self) -> &Arc<ActivityLedger> {
        &self.ledger
    }

    async fn registry(&self) -> Result<MutexGuard<'_, Registry>> {
        within("registry lock", self.config.timeouts.lock(), self.registry.lock()).await
    }

    async fn lookup(&self, task_id: &str) -> Result<Option<Arc<ManagedSession>>> {
        Ok(self.registry().await?.get(task_id).cloned())
    }

    async fn require(&self, task_id: &str) -> Result<Arc<ManagedSession>> {
        self.lookup(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no session for task {task_id}")))
    }

    // ── Create ──────────────────────────────────────────────────

    /// Register a new `Idle` session without taking a slot.
    ///
    /// An existing active (or busy) session is returned unchanged; an
    /// inactive one is torn down and replaced.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unavailable` if either adapter cannot be built,
    /// or `AppError::Timeout` if the registry lock or settings lookup hangs.
    pub async fn create_session(
        &self,
        task_id: &str,
        working_dir: impl Into<PathBuf>,
        doc_path: impl Into<String>,
        cli_kind: Option<CliKind>,
        callback_base: impl Into<String>,
    ) -> Result<Arc<ManagedSession>> {
        let config = SessionConfig {
            working_dir: working_dir.into(),
            doc_path: doc_path.into(),
            cli_kind: CliKind::ClaudeCode,
            callback_base: callback_base.into(),
        };
        self.register(task_id, config, cli_kind, true).await
    }

    /// Build and register a session. With `replace_inactive` unset any
    /// existing entry wins, so two first starts racing for one task share a
    /// session.
    async fn register(
        &self,
        task_id: &str,
        mut config: SessionConfig,
        cli_kind: Option<CliKind>,
        replace_inactive: bool,
    ) -> Result<Arc<ManagedSession>> {
        let span = info_span!("create_session", task_id);

        async move {
            let keep = |existing: &ManagedSession| {
                !replace_inactive || existing.is_active() || existing.is_busy()
            };
            if let Some(existing) = self.lookup(task_id).await? {
                if keep(&existing) {
                    debug!(status = existing.status().as_str(), "session already registered");
                    return Ok(existing);
                }
            }

            let cli_kind = match cli_kind {
                Some(kind) => kind,
                None => bounded("cli setting", self.config.timeouts.render(), self.settings.cli_type())
                    .await?
                    .parse()?,
            };
            let terminal_kind =
                bounded("terminal setting", self.config.timeouts.render(), self.settings.terminal_type()).await?;

            let terminal = self.factory.terminal(&terminal_kind)?;
            let cli = self.factory.cli(cli_kind)?;

            config.cli_kind = cli_kind;
            if config.callback_base.is_empty() {
                config.callback_base.clone_from(&self.config.callback_base);
            }
            let session = Arc::new(ManagedSession::new(task_id, config, terminal, cli));

            let replaced = {
                let mut registry = self.registry().await?;
                let kept = registry
                    .get(task_id)
                    .filter(|existing| keep(existing))
                    .cloned();
                if let Some(existing) = kept {
                    return Ok(existing);
                }
                registry.insert(task_id.to_owned(), Arc::clone(&session))
            };

            if let Some(old) = replaced {
                debug!("replacing inactive session");
                old.cancel_run();
                self.teardown(&old).await;
            }

            info!(terminal = session.terminal_name(), cli = %cli_kind, "session created");
            Ok(session)
        }
        .instrument(span)
        .await
    }

    // ── Start ───────────────────────────────────────────────────

    /// Start (or re-start) the worker for a task.
    ///
    /// Creates the session when absent, refreshes its configuration, and if
    /// it is not already running takes a slot, opens the window, delivers
    /// the rendered first prompt and marks it `Running`. A start arriving
    /// while another is in flight for the same task succeeds without
    /// starting twice.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidState` when a new session lacks `working_dir` or `doc_path`.
    /// - `AppError::Capacity` / `AppError::Timeout` when no slot is available.
    /// - `AppError::Cancelled` when a concurrent stop interrupts the start.
    /// - Adapter, template and timeout errors from the launch steps; the
    ///   session is then in `Error`, holds no slot and any window it opened
    ///   is closed.
    pub async fn start_session(&self, request: StartRequest) -> Result<()> {
        let span = info_span!("start_session", task_id = %request.task_id);
        async move {
            let session = match self.lookup(&request.task_id).await? {
                Some(session) => session,
                None => {
                    let (Some(working_dir), Some(doc_path)) =
                        (request.working_dir.clone(), request.doc_path.clone())
                    else {
                        return Err(AppError::InvalidState(
                            "working_dir and doc_path are required to create a session".into(),
                        ));
                    };
                    let config = SessionConfig {
                        working_dir,
                        doc_path,
                        cli_kind: CliKind::ClaudeCode,
                        callback_base: request.callback_base.clone().unwrap_or_default(),
                    };
                    self.register(&request.task_id, config, request.cli_kind, false)
                        .await?
                }
            };

            let _lifecycle = match session.lifecycle().try_lock() {
                Ok(guard) => guard,
                Err(_) if session.is_active() => {
                    info!("start already in flight");
                    return Ok(());
                }
                Err(_) => within("lifecycle lock", self.config.timeouts.lock(), session.lifecycle().lock()).await?,
            };

            self.refresh(&session, &request);

            if session.is_terminal() {
                if session.release_slot() {
                    debug!("released stale slot");
                }
                self.close_window(&session).await;
            }

            if session.verify_alive().await {
                info!("session already running");
                return Ok(());
            }

            let slot = if session.holds_slot() {
                None
            } else {
                Some(self.slots.acquire(self.config.timeouts.slot()).await?)
            };

            let cancel = session.begin_run();
            session.mark_starting(slot);

            match self.launch(&session, &request.template, &cancel).await {
                Ok(()) => {
                    session.mark_running();
                    self.ledger.record_activity(session.task_id());
                    self.spawn_monitor(&session, &cancel);
                    info!("session running");
                    Ok(())
                }
                Err(err @ AppError::Cancelled(_)) => {
                    info!(%err, "session start interrupted by stop");
                    self.close_window(&session).await;
                    session.mark_stopped();
                    Err(err)
                }
                Err(err) => {
                    warn!(%err, "session start failed");
                    self.close_window(&session).await;
                    session.mark_error(err.to_string());
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn refresh(&self, session: &ManagedSession, request: &StartRequest) {
        session.update_config(|config| {
            if let Some(dir) = &request.working_dir {
                config.working_dir.clone_from(dir);
            }
            if let Some(doc) = &request.doc_path {
                config.doc_path.clone_from(doc);
            }
            if let Some(base) = request.callback_base.as_ref().filter(|base| !base.is_empty()) {
                config.callback_base.clone_from(base);
            }
        });

        let Some(kind) = request.cli_kind else {
            return;
        };
        let current = session.cli().kind();
        if kind == current {
            return;
        }
        match self.factory.cli(kind) {
            Ok(cli) => {
                session.swap_cli(cli);
                info!(from = %current, to = %kind, "agent cli switched");
            }
            Err(err) => warn!(%err, "keeping current agent cli"),
        }
    }

    async fn launch(
        &self,
        session: &ManagedSession,
        template: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let timeouts = &self.config.timeouts;
        let config = session.config();
        let cli = session.cli();

        let message = guarded(
            "render template",
            timeouts.render(),
            cancel,
            self.render(session.task_id(), &config, template),
        )
        .await?;

        let request = WindowRequest::new(
            session.task_id(),
            config.working_dir.clone(),
            cli.start_command(&config.working_dir, session.terminal_kind().shell_dialect()),
            cli.env_vars(session.task_id(), &config.callback_base),
        );

        {
            let mut terminal = within("terminal lock", timeouts.lock(), session.terminal().lock()).await?;
            guarded(
                "create window",
                timeouts.terminal(),
                cancel,
                terminal.create_window(&request),
            )
            .await?;
        }

        deadline::pause("worker settle", timeouts.settle(), cancel).await?;

        if let Some(clear) = cli.clear_session_command() {
            self.deliver(session, clear, cancel).await?;
            deadline::pause("clear settle", timeouts.clear_settle(), cancel).await?;
        }

        self.deliver(session, &cli.format_prompt(&message), cancel)
            .await
    }

    async fn deliver(&self, session: &ManagedSession, text: &str, cancel: &CancellationToken) -> Result<()> {
        let timeouts = &self.config.timeouts;
        let mut terminal = within("terminal lock", timeouts.lock(), session.terminal().lock()).await?;
        guarded(
            "send text",
            timeouts.terminal(),
            cancel,
            terminal.send_text(text, true),
        )
        .await
    }

    async fn render(&self, task_id: &str, config: &SessionConfig, template: &str) -> Result<String> {
        let locale = self.settings.language().await?;
        let fields = TemplateFields {
            task_id: task_id.to_owned(),
            project_dir: config.working_dir.to_string_lossy().into_owned(),
            doc_path: config.doc_path.clone(),
            callback_base: config.callback_base.clone(),
        };
        self.renderer.render(template, &locale, &fields).await
    }

    /// Render `template` for `session` with its current configuration.
    ///
    /// # Errors
    ///
    /// Returns renderer errors, or `AppError::Timeout` when rendering hangs.
    pub async fn render_for(&self, session: &ManagedSession, template: &str) -> Result<String> {
        let config = session.config();
        bounded(
            "render template",
            self.config.timeouts.render(),
            self.render(session.task_id(), &config, template),
        )
        .await
    }

    fn spawn_monitor(&self, session: &Arc<ManagedSession>, cancel: &CancellationToken) {
        let Some(interval) = self.config.watchdog.status_poll() else {
            return;
        };
        if !session.cli().supports_status_query() {
            return;
        }
        let handle = status_monitor::spawn(Arc::clone(session), interval, cancel.child_token());
        session.set_monitor(handle);
    }

    // ── Stop / remove ───────────────────────────────────────────

    /// Stop the worker and free its slot. The session stays registered.
    ///
    /// Cancels an in-flight start first, so a stop never waits behind a
    /// slow launch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown tasks and
    /// `AppError::Timeout` if the lifecycle lock cannot be taken.
    pub async fn stop_session(&self, task_id: &str) -> Result<()> {
        let span = info_span!("stop_session", task_id);
        async move {
            let session = self.require(task_id).await?;
            session.cancel_run();
            let _lifecycle = within("lifecycle lock", self.config.timeouts.lock(), session.lifecycle().lock()).await?;
            self.shutdown(&session).await;
            self.ledger.clear_recovering(task_id);
            info!("session stopped");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Stop if needed and drop the registry entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown tasks and
    /// `AppError::Timeout` if a lock cannot be taken.
    pub async fn remove_session(&self, task_id: &str) -> Result<()> {
        let span = info_span!("remove_session", task_id);
        async move {
            let session = self
                .registry()
                .await?
                .remove(task_id)
                .ok_or_else(|| AppError::NotFound(format!("no session for task {task_id}")))?;

            session.cancel_run();
            match within("lifecycle lock", self.config.timeouts.lock(), session.lifecycle().lock()).await {
                Ok(_lifecycle) => self.shutdown(&session).await,
                Err(err) => {
                    warn!(%err, "removing session without orderly stop");
                    self.teardown(&session).await;
                }
            }
            self.ledger.retire(task_id);
            info!("session removed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Stop every registered session, returning how many stopped cleanly.
    pub async fn stop_all_sessions(&self) -> usize {
        let task_ids: Vec<String> = match self.registry().await {
            Ok(registry) => registry.keys().cloned().collect(),
            Err(err) => {
                warn!(%err, "cannot list sessions to stop");
                return 0;
            }
        };

        let mut stopped = 0;
        for task_id in &task_ids {
            match self.stop_session(task_id).await {
                Ok(()) => stopped += 1,
                Err(err) => warn!(task_id, %err, "failed to stop session"),
            }
        }
        info!(stopped, total = task_ids.len(), "stopped all sessions");
        stopped
    }

    /// Orderly stop. Caller holds the lifecycle lock.
    async fn shutdown(&self, session: &ManagedSession) {
        if session.is_terminal() {
            session.release_slot();
            self.close_window(session).await;
            return;
        }

        session.mark_stopping();
        session.cancel_run();
        if let Some(monitor) = session.take_monitor() {
            if within("status monitor", self.config.timeouts.cleanup(), monitor).await.is_err() {
                warn!(task_id = session.task_id(), "status monitor did not stop in time");
            }
        }
        self.close_window(session).await;
        session.mark_stopped();
    }

    /// Stop a session whose worker exited and left its window at a shell
    /// prompt, closing that window. Returns `false` without touching the
    /// session while another lifecycle operation holds it.
    pub async fn reap_exited(&self, session: &ManagedSession) -> bool {
        let Ok(_lifecycle) = session.lifecycle().try_lock() else {
            return false;
        };
        if session.is_active() {
            warn!(task_id = session.task_id(), "worker exited to the shell, closing its window");
            self.shutdown(session).await;
        }
        true
    }

    /// Best-effort release of everything a discarded session holds.
    async fn teardown(&self, session: &ManagedSession) {
        if let Some(monitor) = session.take_monitor() {
            monitor.abort();
        }
        self.close_window(session).await;
        if !session.is_terminal() {
            session.mark_stopped();
        }
        session.release_slot();
    }

    async fn close_window(&self, session: &ManagedSession) {
        let cleanup = self.config.timeouts.cleanup();
        let Ok(mut terminal) = within("terminal lock", cleanup, session.terminal().lock()).await else {
            warn!(task_id = session.task_id(), "terminal busy, window left open");
            return;
        };
        if !terminal.has_window() {
            return;
        }
        match bounded("close window", cleanup, terminal.close_window()).await {
            Ok(()) => debug!(task_id = session.task_id(), "window closed"),
            Err(err) => {
                terminal.clear_window();
                warn!(task_id = session.task_id(), %err, "window close failed");
            }
        }
    }

    // ── Restart / messaging ─────────────────────────────────────

    /// Stop and start again with the same configuration, then send the
    /// resume prompt. The watchdog ignores the task while this runs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown tasks and any error from
    /// the start, render or send steps.
    pub async fn restart_session(&self, task_id: &str) -> Result<()> {
        let span = info_span!("restart_session", task_id);
        async move {
            let session = self.require(task_id).await?;
            let _transition = self.ledger.safe_transition(task_id);
            let config = session.config();

            if let Err(err) = self.stop_session(task_id).await {
                warn!(%err, "stop before restart failed");
            }

            self.start_session(
                StartRequest::new(task_id)
                    .working_dir(config.working_dir.clone())
                    .doc_path(config.doc_path.clone())
                    .callback_base(config.callback_base.clone()),
            )
            .await?;

            let message = self.render_for(&session, TEMPLATE_RESUME).await?;
            self.send_message(task_id, &message).await?;
            info!("session restarted");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Type `text` into an active session's window and press Enter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown tasks,
    /// `AppError::InvalidState` for inactive sessions, and terminal or
    /// timeout errors from delivery.
    pub async fn send_message(&self, task_id: &str, text: &str) -> Result<()> {
        let session = self.require(task_id).await?;
        if !session.is_active() {
            return Err(AppError::InvalidState(format!(
                "session {task_id} is {}",
                session.status().as_str()
            )));
        }
        let cancel = session.run_token();
        match self.deliver(&session, text, &cancel).await {
            Ok(()) => {
                debug!(task_id, "message sent");
                Ok(())
            }
            Err(err) => {
                warn!(task_id, %err, "message delivery failed");
                Err(err)
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────

    async fn select(&self, keep: impl Fn(&ManagedSession) -> bool) -> Result<Vec<Arc<ManagedSession>>> {
        Ok(self
            .registry()
            .await?
            .values()
            .filter(|session| keep(session))
            .cloned()
            .collect())
    }

    async fn collect(&self, keep: impl Fn(&ManagedSession) -> bool) -> Vec<Arc<ManagedSession>> {
        self.select(keep).await.unwrap_or_else(|err| {
            warn!(%err, "session registry unavailable");
            Vec::new()
        })
    }

    /// Active sessions, surfacing a stuck registry as an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Timeout` if the registry lock cannot be taken.
    pub async fn try_active_sessions(&self) -> Result<Vec<Arc<ManagedSession>>> {
        self.select(ManagedSession::is_active).await
    }

    /// Session for `task_id`.
    pub async fn get_session(&self, task_id: &str) -> Option<Arc<ManagedSession>> {
        self.lookup(task_id)
            .await
            .inspect_err(|err| warn!(task_id, %err, "session lookup failed"))
            .ok()
            .flatten()
    }

    /// Every registered session.
    pub async fn all_sessions(&self) -> Vec<Arc<ManagedSession>> {
        self.collect(|_| true).await
    }

    /// Sessions in `Starting` or `Running`.
    pub async fn active_sessions(&self) -> Vec<Arc<ManagedSession>> {
        self.collect(ManagedSession::is_active).await
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.all_sessions().await.len()
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        self.active_sessions().await.len()
    }

    /// Slots a new session could take right now.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available()
    }

    /// Current concurrency limit.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.slots.limit()
    }

    /// Snapshots of every session, ordered by task id.
    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .all_sessions()
            .await
            .iter()
            .map(|session| session.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        snapshots
    }

    /// Change the concurrency limit. Running sessions keep their slots;
    /// new starts wait until usage drops below the new limit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `limit` is outside `1..=10`.
    pub fn update_max_concurrent(&self, limit: usize) -> Result<()> {
        validate_max_concurrent(limit)?;
        let previous = self.slots.limit();
        self.slots.resize(limit);
        info!(previous, limit, "max concurrent sessions updated");
        Ok(())
    }
}

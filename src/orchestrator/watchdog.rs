//! Periodic health check and automatic recovery of worker sessions.
//!
//! Each tick walks the active sessions plus any dead worker still awaiting
//! recovery, classifies them as [`Health::Healthy`], [`Health::Idle`] or
//! [`Health::Terminated`], nudges idle workers and restarts dead ones.
//! Tasks inside a planned stop/restart window and sessions with a lifecycle
//! operation in flight are left alone for the tick.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::deadline::{bounded, within};
use super::ledger::{ActivityLedger, SafeTransitionGuard};
use super::session::ManagedSession;
use super::session_manager::{SessionManager, StartRequest};
use crate::config::WatchdogConfig;
use crate::models::health::{ActivityProbe, Health};
use crate::services::{
    recovery_template_for, RecoveryNotifier, TaskStatusReader, REASON_TERMINATED, TEMPLATE_CONTINUE,
};
use crate::Result;

/// Map the three health signals to a verdict.
///
/// `heartbeat_overdue` only matters when the terminal has no native
/// activity probe; callers pass `false` unless heartbeat fallback is on.
/// A window whose worker exited to the shell counts as terminated.
#[must_use]
pub fn classify_health(alive: bool, probe: ActivityProbe, heartbeat_overdue: bool) -> Health {
    if !alive {
        return Health::Terminated;
    }
    match probe {
        ActivityProbe::Exited => Health::Terminated,
        ActivityProbe::Active => Health::Healthy,
        ActivityProbe::Idle => Health::Idle,
        ActivityProbe::Unsupported if heartbeat_overdue => Health::Idle,
        ActivityProbe::Unsupported => Health::Healthy,
    }
}

/// Outcome counters for one watchdog tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions classified this tick.
    pub checked: usize,
    /// Sessions skipped (safe transition or busy).
    pub skipped: usize,
    /// Sessions found healthy.
    pub healthy: usize,
    /// Idle sessions that were nudged successfully.
    pub nudged: usize,
    /// Dead sessions restarted successfully.
    pub recovered: usize,
    /// Nudges or restarts that failed and will be retried next tick.
    pub failed: usize,
}

/// Background supervisor over a [`SessionManager`].
pub struct SessionWatchdog {
    manager: Arc<SessionManager>,
    task_reader: Option<Arc<dyn TaskStatusReader>>,
    notifier: Option<Arc<dyn RecoveryNotifier>>,
    config: WatchdogConfig,
}

impl std::fmt::Debug for SessionWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWatchdog")
            .field("config", &self.config)
            .field("task_reader", &self.task_reader.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionWatchdog {
    /// Watchdog over `manager`. Without a task reader every recovery uses
    /// the continue template.
    #[must_use]
    pub fn new(
        manager: Arc<SessionManager>,
        task_reader: Option<Arc<dyn TaskStatusReader>>,
        notifier: Option<Arc<dyn RecoveryNotifier>>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            manager,
            task_reader,
            notifier,
            config,
        }
    }

    fn ledger(&self) -> &Arc<ActivityLedger> {
        self.manager.ledger()
    }

    // ── Ledger ──────────────────────────────────────────────────

    /// Stamp `task_id` as active now.
    pub fn record_activity(&self, task_id: &str) {
        self.ledger().record_activity(task_id);
    }

    /// Forget the activity stamp for `task_id`.
    pub fn clear_activity(&self, task_id: &str) {
        self.ledger().clear_activity(task_id);
    }

    /// Last recorded activity for `task_id`.
    #[must_use]
    pub fn last_activity(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.ledger().last_activity(task_id)
    }

    /// Exclude `task_id` from checks until [`Self::end_safe_transition`].
    pub fn begin_safe_transition(&self, task_id: &str) {
        self.ledger().begin_safe_transition(task_id);
    }

    /// Re-include `task_id` in checks.
    pub fn end_safe_transition(&self, task_id: &str) {
        self.ledger().end_safe_transition(task_id);
    }

    /// Whether `task_id` is currently excluded.
    #[must_use]
    pub fn is_in_safe_transition(&self, task_id: &str) -> bool {
        self.ledger().is_in_safe_transition(task_id)
    }

    /// Exclude `task_id` while the returned guard lives.
    #[must_use]
    pub fn safe_transition(&self, task_id: &str) -> SafeTransitionGuard {
        self.ledger().safe_transition(task_id)
    }

    /// Forget everything tracked for `task_id`.
    pub fn retire(&self, task_id: &str) {
        self.ledger().retire(task_id);
    }

    // ── Loop ────────────────────────────────────────────────────

    /// Run the check loop until `cancel` fires. A disabled watchdog returns
    /// a task that ends immediately.
    #[must_use]
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                if !self.config.enabled {
                    info!("watchdog disabled");
                    return;
                }

                let period = self.config.check_interval();
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(interval_secs = period.as_secs(), "watchdog started");

                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    match self.check_all_sessions().await {
                        Ok(report) => debug!(?report, "watchdog tick"),
                        Err(err) => {
                            warn!(%err, "watchdog tick failed, backing off");
                            tokio::select! {
                                () = cancel.cancelled() => break,
                                () = tokio::time::sleep(self.config.error_backoff()) => {}
                            }
                            ticker.reset();
                        }
                    }
                }
                info!("watchdog stopped");
            }
            .instrument(info_span!("session_watchdog")),
        )
    }

    /// Run a single check over every candidate session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Timeout` if the session registry cannot be read.
    /// Per-session failures are counted in the report, not returned.
    pub async fn check_all_sessions(&self) -> Result<TickReport> {
        let mut report = TickReport::default();
        let mut candidates = self.manager.try_active_sessions().await?;
        let mut seen: HashSet<String> = candidates.iter().map(|s| s.task_id().to_owned()).collect();

        for task_id in self.ledger().recovering() {
            if seen.contains(&task_id) {
                continue;
            }
            match self.manager.get_session(&task_id).await {
                Some(session) => {
                    seen.insert(task_id);
                    candidates.push(session);
                }
                None => self.ledger().clear_recovering(&task_id),
            }
        }

        for session in candidates {
            let task_id = session.task_id().to_owned();
            if self.is_in_safe_transition(&task_id) || session.is_busy() {
                debug!(task_id, "skipping session this tick");
                report.skipped += 1;
                continue;
            }

            report.checked += 1;
            let health = self.classify(&session).await;
            match health {
                Health::Healthy => {
                    self.ledger().clear_recovering(&task_id);
                    report.healthy += 1;
                }
                Health::Idle => {
                    self.ledger().clear_recovering(&task_id);
                    if self.handle_idle(&session).await {
                        report.nudged += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Health::Terminated => {
                    if self.handle_terminated(&session).await {
                        report.recovered += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Classify one session. Demotes ghosts as a side effect of the liveness
    /// check, and stops a session whose worker exited back to the shell so
    /// recovery opens a fresh window instead of typing into that shell.
    pub async fn classify(&self, session: &ManagedSession) -> Health {
        if !session.verify_alive().await {
            return Health::Terminated;
        }

        let limit = self.manager.config().timeouts.terminal();
        let probe = match within("terminal lock", limit, session.terminal().lock()).await {
            Ok(terminal) => within("activity probe", limit, terminal.is_agent_active())
                .await
                .unwrap_or(ActivityProbe::Unsupported),
            Err(err) => {
                debug!(task_id = session.task_id(), %err, "terminal busy, no activity probe");
                ActivityProbe::Unsupported
            }
        };

        if probe == ActivityProbe::Exited && !self.manager.reap_exited(session).await {
            debug!(task_id = session.task_id(), "exited worker is busy, retrying next tick");
            return Health::Healthy;
        }

        classify_health(true, probe, self.heartbeat_overdue(session.task_id()))
    }

    fn heartbeat_overdue(&self, task_id: &str) -> bool {
        if !self.config.heartbeat_fallback {
            return false;
        }
        let Some(last) = self.last_activity(task_id) else {
            return false;
        };
        let silent = Utc::now().signed_duration_since(last).to_std().unwrap_or_default();
        silent > self.config.heartbeat_timeout()
    }

    async fn handle_terminated(&self, session: &ManagedSession) -> bool {
        let task_id = session.task_id();
        let span = info_span!("recover_session", task_id);
        async move {
            if self.ledger().mark_recovering(task_id) {
                warn!("worker terminated unexpectedly");
                if let Some(notifier) = &self.notifier {
                    let limit = self.manager.config().timeouts.render();
                    let notified = notifier.notify(task_id, REASON_TERMINATED);
                    if let Err(err) = bounded("recovery notification", limit, notified).await {
                        warn!(%err, "recovery notification failed");
                    }
                }
            }

            let template = self.recovery_template(task_id).await;
            let config = session.config();
            let request = StartRequest::new(task_id)
                .working_dir(config.working_dir)
                .doc_path(config.doc_path)
                .cli(config.cli_kind)
                .callback_base(config.callback_base)
                .template(template);

            match self.manager.start_session(request).await {
                Ok(()) => {
                    self.ledger().clear_recovering(task_id);
                    self.record_activity(task_id);
                    info!(template, "worker recovered");
                    true
                }
                Err(err) => {
                    warn!(%err, "recovery failed, retrying next tick");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn recovery_template(&self, task_id: &str) -> &'static str {
        let Some(reader) = &self.task_reader else {
            return TEMPLATE_CONTINUE;
        };
        let limit = self.manager.config().timeouts.render();
        match bounded("task status", limit, reader.raw_task(task_id)).await {
            Ok(record) => recovery_template_for(record.as_ref().map(|task| task.status.as_str())),
            Err(err) => {
                warn!(task_id, %err, "task status unavailable");
                TEMPLATE_CONTINUE
            }
        }
    }

    async fn handle_idle(&self, session: &ManagedSession) -> bool {
        let task_id = session.task_id();
        let sent = match self.manager.render_for(session, TEMPLATE_CONTINUE).await {
            Ok(message) => self.manager.send_message(task_id, &message).await,
            Err(err) => Err(err),
        };
        match sent {
            Ok(()) => {
                self.record_activity(task_id);
                info!(task_id, "idle worker nudged");
                true
            }
            Err(err) => {
                warn!(task_id, %err, "idle nudge failed");
                false
            }
        }
    }
}

//! Activity ledger shared by the session manager and the watchdog.
//!
//! Tracks when each task last showed activity, which tasks are inside a
//! planned stop/restart window that the watchdog must leave alone, and which
//! dead workers still await automatic recovery.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
struct LedgerState {
    activity: HashMap<String, DateTime<Utc>>,
    transitions: HashSet<String>,
    recovering: HashSet<String>,
}

/// Last-activity timestamps and safe-transition markers, keyed by task id.
#[derive(Debug, Default)]
pub struct ActivityLedger {
    state: Mutex<LedgerState>,
}

impl ActivityLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamp `task_id` as active now.
    pub fn record_activity(&self, task_id: &str) {
        self.record_activity_at(task_id, Utc::now());
    }

    /// Stamp `task_id` as active at `at`.
    pub fn record_activity_at(&self, task_id: &str, at: DateTime<Utc>) {
        self.state().activity.insert(task_id.to_owned(), at);
    }

    /// Forget the activity stamp for `task_id`.
    pub fn clear_activity(&self, task_id: &str) {
        self.state().activity.remove(task_id);
    }

    /// Last recorded activity.
    #[must_use]
    pub fn last_activity(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.state().activity.get(task_id).copied()
    }

    /// Mark `task_id` as inside a planned transition.
    pub fn begin_safe_transition(&self, task_id: &str) {
        self.state().transitions.insert(task_id.to_owned());
    }

    /// Clear the planned-transition mark.
    pub fn end_safe_transition(&self, task_id: &str) {
        self.state().transitions.remove(task_id);
    }

    /// Whether `task_id` is inside a planned transition.
    #[must_use]
    pub fn is_in_safe_transition(&self, task_id: &str) -> bool {
        self.state().transitions.contains(task_id)
    }

    /// Mark `task_id` for as long as the returned guard lives.
    #[must_use]
    pub fn safe_transition(self: &Arc<Self>, task_id: &str) -> SafeTransitionGuard {
        self.begin_safe_transition(task_id);
        SafeTransitionGuard {
            ledger: Arc::clone(self),
            task_id: task_id.to_owned(),
        }
    }

    /// Flag a dead worker for recovery. Returns `false` if it already was.
    pub fn mark_recovering(&self, task_id: &str) -> bool {
        self.state().recovering.insert(task_id.to_owned())
    }

    /// Drop the recovery flag, after a successful restart or a deliberate stop.
    pub fn clear_recovering(&self, task_id: &str) {
        self.state().recovering.remove(task_id);
    }

    /// Whether `task_id` awaits recovery.
    #[must_use]
    pub fn is_recovering(&self, task_id: &str) -> bool {
        self.state().recovering.contains(task_id)
    }

    /// Tasks awaiting recovery, sorted.
    #[must_use]
    pub fn recovering(&self) -> Vec<String> {
        let mut pending: Vec<String> = self.state().recovering.iter().cloned().collect();
        pending.sort();
        pending
    }

    /// Drop every entry for a task that is gone for good.
    pub fn retire(&self, task_id: &str) {
        let mut state = self.state();
        state.activity.remove(task_id);
        state.transitions.remove(task_id);
        state.recovering.remove(task_id);
    }
}

/// Ends a safe-transition window on drop.
#[derive(Debug)]
pub struct SafeTransitionGuard {
    ledger: Arc<ActivityLedger>,
    task_id: String,
}

impl SafeTransitionGuard {
    /// Task the guard covers.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Drop for SafeTransitionGuard {
    fn drop(&mut self) {
        self.ledger.end_safe_transition(&self.task_id);
    }
}

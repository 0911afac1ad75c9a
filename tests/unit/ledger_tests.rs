//! Unit tests for the activity ledger.

use std::sync::Arc;

use agent_conductor::orchestrator::ledger::ActivityLedger;
use chrono::{Duration, Utc};

#[test]
fn activity_is_recorded_and_cleared() {
    let ledger = ActivityLedger::new();
    assert!(ledger.last_activity("T-1").is_none());

    let at = Utc::now() - Duration::minutes(5);
    ledger.record_activity_at("T-1", at);
    assert_eq!(ledger.last_activity("T-1"), Some(at));

    ledger.record_activity("T-1");
    assert!(ledger.last_activity("T-1").expect("stamp") > at);

    ledger.clear_activity("T-1");
    assert!(ledger.last_activity("T-1").is_none());
}

#[test]
fn safe_transition_guard_ends_on_drop() {
    let ledger = Arc::new(ActivityLedger::new());
    {
        let guard = ledger.safe_transition("T-1");
        assert_eq!(guard.task_id(), "T-1");
        assert!(ledger.is_in_safe_transition("T-1"));
        assert!(!ledger.is_in_safe_transition("T-2"));
    }
    assert!(!ledger.is_in_safe_transition("T-1"));
}

#[test]
fn explicit_begin_and_end() {
    let ledger = ActivityLedger::new();
    ledger.begin_safe_transition("T-1");
    assert!(ledger.is_in_safe_transition("T-1"));
    ledger.end_safe_transition("T-1");
    assert!(!ledger.is_in_safe_transition("T-1"));
}

#[test]
fn recovery_flag_reports_first_mark_only() {
    let ledger = ActivityLedger::new();
    assert!(ledger.mark_recovering("T-2"));
    assert!(!ledger.mark_recovering("T-2"));
    assert!(ledger.mark_recovering("T-1"));
    assert_eq!(ledger.recovering(), vec!["T-1".to_owned(), "T-2".to_owned()]);

    ledger.clear_recovering("T-2");
    assert!(!ledger.is_recovering("T-2"));
}

#[test]
fn retire_forgets_everything() {
    let ledger = ActivityLedger::new();
    ledger.record_activity("T-1");
    ledger.begin_safe_transition("T-1");
    ledger.mark_recovering("T-1");

    ledger.retire("T-1");
    assert!(ledger.last_activity("T-1").is_none());
    assert!(!ledger.is_in_safe_transition("T-1"));
    assert!(!ledger.is_recovering("T-1"));
}

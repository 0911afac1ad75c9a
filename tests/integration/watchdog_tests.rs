//! Integration tests for watchdog classification, nudging and recovery.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use agent_conductor::models::health::{ActivityProbe, Health};
use agent_conductor::models::session::SessionStatus;
use agent_conductor::orchestrator::watchdog::{SessionWatchdog, TickReport};
use agent_conductor::services::{
    RecoveryNotifier, TaskStatusReader, TASK_STATUS_IN_PROGRESS, TASK_STATUS_IN_REVIEW,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{
    harness, harness_with, start_request, test_config, FakeNotifier, FakeTaskReader, Harness,
};

struct Rig {
    h: Harness,
    watchdog: Arc<SessionWatchdog>,
    tasks: Arc<FakeTaskReader>,
    notifier: Arc<FakeNotifier>,
}

fn rig_from(h: Harness) -> Rig {
    let tasks = Arc::new(FakeTaskReader::default());
    let notifier = Arc::new(FakeNotifier::default());
    let watchdog = Arc::new(SessionWatchdog::new(
        Arc::clone(&h.manager),
        Some(Arc::clone(&tasks) as Arc<dyn TaskStatusReader>),
        Some(Arc::clone(&notifier) as Arc<dyn RecoveryNotifier>),
        h.manager.config().watchdog.clone(),
    ));
    Rig {
        h,
        watchdog,
        tasks,
        notifier,
    }
}

async fn running_rig(task_id: &str) -> Rig {
    let rig = rig_from(harness(2));
    rig.h.manager.start_session(start_request(task_id)).await.expect("start");
    rig
}

#[tokio::test]
async fn session_without_activity_signal_is_healthy() {
    let rig = running_rig("T-1").await;
    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(
        report,
        TickReport {
            checked: 1,
            healthy: 1,
            ..TickReport::default()
        }
    );
    assert_eq!(rig.h.factory.terminal_for("T-1").sent().len(), 2, "nothing sent");
}

#[tokio::test]
async fn native_active_signal_is_healthy() {
    let rig = running_rig("T-1").await;
    rig.h.factory.terminal_for("T-1").set_probe(ActivityProbe::Active);

    let session = rig.h.manager.get_session("T-1").await.expect("session");
    assert_eq!(rig.watchdog.classify(&session).await, Health::Healthy);
}

#[tokio::test]
async fn idle_worker_is_nudged() {
    let rig = running_rig("T-1").await;
    let terminal = rig.h.factory.terminal_for("T-1");
    terminal.set_probe(ActivityProbe::Idle);
    rig.h.manager.ledger().clear_activity("T-1");

    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.nudged, 1);
    assert_eq!(terminal.sent().last().map(String::as_str), Some("continue_task:en:T-1"));
    assert!(rig.watchdog.last_activity("T-1").is_some());
}

#[tokio::test]
async fn worker_exited_to_shell_gets_a_fresh_window() {
    let rig = running_rig("T-1").await;
    let terminal = rig.h.factory.terminal_for("T-1");
    terminal.set_probe(ActivityProbe::Exited);

    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.recovered, 1);
    assert_eq!(report.nudged, 0);
    assert_eq!((terminal.creates(), terminal.closes()), (2, 1));

    let sent = terminal.sent();
    assert!(!sent.iter().any(|text| text == "continue_task:en:T-1"), "typed into the shell: {sent:?}");
    assert_eq!(sent.last().map(String::as_str), Some("[claude_code] continue_task:en:T-1"));
    assert_eq!(
        *rig.notifier.calls.lock().unwrap(),
        vec![("T-1".to_owned(), "terminated".to_owned())]
    );

    let session = rig.h.manager.get_session("T-1").await.expect("session");
    assert_eq!(session.status(), SessionStatus::Running);
    assert_eq!(rig.h.manager.available_slots(), 1);
}

#[tokio::test]
async fn exited_worker_under_lifecycle_operation_is_left_alone() {
    let rig = running_rig("T-1").await;
    let terminal = rig.h.factory.terminal_for("T-1");
    terminal.set_probe(ActivityProbe::Exited);
    let session = rig.h.manager.get_session("T-1").await.expect("session");

    {
        let _lifecycle = session.lifecycle().lock().await;
        assert_eq!(rig.watchdog.classify(&session).await, Health::Healthy);
    }
    assert_eq!(terminal.closes(), 0);
    assert_eq!(session.status(), SessionStatus::Running);

    assert_eq!(rig.watchdog.classify(&session).await, Health::Terminated);
    assert_eq!(terminal.closes(), 1);
    assert_eq!(session.status(), SessionStatus::Stopped);
}

#[tokio::test]
async fn dead_in_progress_task_is_resumed() {
    let rig = running_rig("T-1").await;
    rig.tasks.set("T-1", TASK_STATUS_IN_PROGRESS);
    rig.h.factory.terminal_for("T-1").kill_window();

    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.recovered, 1);

    let session = rig.h.manager.get_session("T-1").await.expect("session");
    assert_eq!(session.status(), SessionStatus::Running);
    let terminal = rig.h.factory.terminal_for("T-1");
    assert_eq!(terminal.creates(), 2);
    assert_eq!(
        terminal.sent().last().map(String::as_str),
        Some("[claude_code] resume_task:en:T-1")
    );
    assert_eq!(
        *rig.notifier.calls.lock().unwrap(),
        vec![("T-1".to_owned(), "terminated".to_owned())]
    );
}

#[tokio::test(start_paused = true)]
async fn hanging_notifier_does_not_stall_recovery() {
    let rig = running_rig("T-1").await;
    rig.notifier.hang.store(true, Ordering::SeqCst);
    rig.h.manager.start_session(start_request("T-2")).await.expect("start T-2");
    rig.h.factory.terminal_for("T-1").kill_window();

    let tick = tokio::time::timeout(Duration::from_secs(30), rig.watchdog.check_all_sessions());
    let report = tick.await.expect("tick finishes").expect("tick");
    assert_eq!(report.checked, 2);
    assert_eq!(report.recovered, 1);
    assert_eq!(report.healthy, 1);
    assert_eq!(rig.notifier.calls.lock().unwrap().len(), 1);
    let session = rig.h.manager.get_session("T-1").await.expect("session");
    assert_eq!(session.status(), SessionStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn hanging_task_store_falls_back_to_continue() {
    let rig = running_rig("T-1").await;
    rig.tasks.set("T-1", TASK_STATUS_IN_PROGRESS);
    rig.tasks.hang.store(true, Ordering::SeqCst);
    let terminal = rig.h.factory.terminal_for("T-1");
    terminal.kill_window();

    let tick = tokio::time::timeout(Duration::from_secs(30), rig.watchdog.check_all_sessions());
    let report = tick.await.expect("tick finishes").expect("tick");
    assert_eq!(report.recovered, 1);
    assert_eq!(
        terminal.sent().last().map(String::as_str),
        Some("[claude_code] continue_task:en:T-1")
    );
}

#[tokio::test]
async fn recovery_template_follows_task_status() {
    for (status, expected) in [
        (Some(TASK_STATUS_IN_REVIEW), "[claude_code] review:en:T-1"),
        (Some("pending"), "[claude_code] continue_task:en:T-1"),
        (None, "[claude_code] continue_task:en:T-1"),
    ] {
        let rig = running_rig("T-1").await;
        if let Some(status) = status {
            rig.tasks.set("T-1", status);
        }
        rig.h.factory.terminal_for("T-1").kill_window();
        rig.watchdog.check_all_sessions().await.expect("tick");
        assert_eq!(
            rig.h.factory.terminal_for("T-1").sent().last().map(String::as_str),
            Some(expected)
        );
    }
}

#[tokio::test]
async fn task_store_failure_falls_back_to_continue() {
    let rig = running_rig("T-1").await;
    rig.tasks.fail.store(true, Ordering::SeqCst);
    rig.notifier.fail.store(true, Ordering::SeqCst);
    rig.h.factory.terminal_for("T-1").kill_window();

    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.recovered, 1, "notifier failure is swallowed");
    assert_eq!(
        rig.h.factory.terminal_for("T-1").sent().last().map(String::as_str),
        Some("[claude_code] continue_task:en:T-1")
    );
}

#[tokio::test]
async fn safe_transition_is_left_alone() {
    let rig = running_rig("T-1").await;
    rig.h.factory.terminal_for("T-1").kill_window();

    {
        let _guard = rig.watchdog.safe_transition("T-1");
        let report = rig.watchdog.check_all_sessions().await.expect("tick");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.checked, 0);
        let session = rig.h.manager.get_session("T-1").await.expect("session");
        assert_eq!(session.status(), SessionStatus::Running, "not even verified");
    }

    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.recovered, 1);
}

#[tokio::test]
async fn busy_session_is_skipped() {
    let rig = running_rig("T-1").await;
    let session = rig.h.manager.get_session("T-1").await.expect("session");
    rig.h.factory.terminal_for("T-1").kill_window();

    let _lifecycle = session.lifecycle().lock().await;
    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.skipped, 1);
    assert!(rig.notifier.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_recovery_is_retried_next_tick() {
    let rig = running_rig("T-1").await;
    let terminal = rig.h.factory.terminal_for("T-1");
    terminal.kill_window();
    terminal.fail_create.store(true, Ordering::SeqCst);

    let report = rig.watchdog.check_all_sessions().await.expect("first tick");
    assert_eq!(report.failed, 1);
    let session = rig.h.manager.get_session("T-1").await.expect("session");
    assert_eq!(session.status(), SessionStatus::Error);
    assert!(rig.h.manager.ledger().is_recovering("T-1"));

    let report = rig.watchdog.check_all_sessions().await.expect("second tick");
    assert_eq!(report.failed, 1);
    assert_eq!(rig.notifier.calls.lock().unwrap().len(), 1, "notified once per outage");

    terminal.fail_create.store(false, Ordering::SeqCst);
    let report = rig.watchdog.check_all_sessions().await.expect("third tick");
    assert_eq!(report.recovered, 1);
    assert_eq!(session.status(), SessionStatus::Running);
    assert!(!rig.h.manager.ledger().is_recovering("T-1"));
}

#[tokio::test]
async fn deliberately_stopped_session_is_not_recovered() {
    let rig = running_rig("T-1").await;
    rig.h.manager.stop_session("T-1").await.expect("stop");

    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report, TickReport::default());
    assert_eq!(rig.h.factory.terminal_for("T-1").creates(), 1);
}

#[tokio::test]
async fn stop_cancels_pending_recovery() {
    let rig = running_rig("T-1").await;
    let terminal = rig.h.factory.terminal_for("T-1");
    terminal.kill_window();
    terminal.fail_create.store(true, Ordering::SeqCst);
    rig.watchdog.check_all_sessions().await.expect("failed recovery");

    rig.h.manager.stop_session("T-1").await.expect("stop");
    terminal.fail_create.store(false, Ordering::SeqCst);

    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.checked, 0);
    assert_eq!(terminal.creates(), 1);
}

#[tokio::test]
async fn heartbeat_fallback_nudges_silent_worker_without_activity_signal() {
    let mut config = test_config(1);
    config.watchdog.heartbeat_fallback = true;
    config.watchdog.heartbeat_timeout_seconds = 60;
    let rig = rig_from(harness_with(config));
    rig.h.manager.start_session(start_request("T-1")).await.expect("start");

    let report = rig.watchdog.check_all_sessions().await.expect("fresh heartbeat");
    assert_eq!(report.healthy, 1);

    rig.h
        .manager
        .ledger()
        .record_activity_at("T-1", Utc::now() - chrono::Duration::minutes(10));
    let report = rig.watchdog.check_all_sessions().await.expect("stale heartbeat");
    assert_eq!(report.nudged, 1);

    let report = rig.watchdog.check_all_sessions().await.expect("after nudge");
    assert_eq!(report.healthy, 1);
}

#[tokio::test]
async fn stale_heartbeat_without_fallback_stays_healthy() {
    let rig = running_rig("T-1").await;
    rig.h
        .manager
        .ledger()
        .record_activity_at("T-1", Utc::now() - chrono::Duration::hours(2));
    let report = rig.watchdog.check_all_sessions().await.expect("tick");
    assert_eq!(report.healthy, 1);
}

#[tokio::test(start_paused = true)]
async fn background_loop_recovers_until_cancelled() {
    let rig = running_rig("T-1").await;
    let cancel = CancellationToken::new();
    let handle = Arc::clone(&rig.watchdog).spawn(cancel.clone());

    rig.h.factory.terminal_for("T-1").kill_window();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(rig.h.factory.terminal_for("T-1").creates(), 2);

    cancel.cancel();
    handle.await.expect("loop ends");
}

#[tokio::test]
async fn disabled_watchdog_exits_immediately() {
    let mut config = test_config(1);
    config.watchdog.enabled = false;
    let rig = rig_from(harness_with(config));
    let handle = Arc::clone(&rig.watchdog).spawn(CancellationToken::new());
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("ends without cancel")
        .expect("join");
}

//! Unit tests for the watchdog's pure health classification.

use agent_conductor::models::health::{ActivityProbe, Health};
use agent_conductor::orchestrator::watchdog::classify_health;

#[test]
fn dead_window_is_terminated_regardless_of_activity() {
    for probe in [
        ActivityProbe::Active,
        ActivityProbe::Idle,
        ActivityProbe::Exited,
        ActivityProbe::Unsupported,
    ] {
        assert_eq!(classify_health(false, probe, true), Health::Terminated);
    }
}

#[test]
fn native_activity_signal_is_followed_directly() {
    assert_eq!(classify_health(true, ActivityProbe::Active, true), Health::Healthy);
    assert_eq!(classify_health(true, ActivityProbe::Idle, false), Health::Idle);
}

#[test]
fn worker_exited_to_shell_is_terminated() {
    assert_eq!(classify_health(true, ActivityProbe::Exited, false), Health::Terminated);
    assert_eq!(classify_health(true, ActivityProbe::Exited, true), Health::Terminated);
}

#[test]
fn unsupported_activity_is_healthy_without_heartbeat_signal() {
    assert_eq!(classify_health(true, ActivityProbe::Unsupported, false), Health::Healthy);
}

#[test]
fn overdue_heartbeat_marks_session_without_activity_signal_idle() {
    assert_eq!(classify_health(true, ActivityProbe::Unsupported, true), Health::Idle);
}

#[test]
fn health_serializes_snake_case() {
    assert_eq!(serde_json::to_string(&Health::Terminated).expect("json"), "\"terminated\"");
    assert_eq!(
        serde_json::to_string(&ActivityProbe::Unsupported).expect("json"),
        "\"unsupported\""
    );
}

//! Unit tests for recovery template selection.

use agent_conductor::services::{
    recovery_template_for, TaskRecord, TASK_STATUS_IN_PROGRESS, TASK_STATUS_IN_REVIEW, TEMPLATE_CONTINUE,
    TEMPLATE_RESUME, TEMPLATE_REVIEW,
};

#[test]
fn in_progress_resumes() {
    assert_eq!(recovery_template_for(Some(TASK_STATUS_IN_PROGRESS)), TEMPLATE_RESUME);
}

#[test]
fn in_review_reviews() {
    assert_eq!(recovery_template_for(Some(TASK_STATUS_IN_REVIEW)), TEMPLATE_REVIEW);
}

#[test]
fn anything_else_continues() {
    assert_eq!(recovery_template_for(Some("pending")), TEMPLATE_CONTINUE);
    assert_eq!(recovery_template_for(Some("done")), TEMPLATE_CONTINUE);
    assert_eq!(recovery_template_for(None), TEMPLATE_CONTINUE);
}

#[test]
fn task_record_keeps_unknown_columns() {
    let record: TaskRecord =
        serde_json::from_str(r#"{"status":"in_progress","title":"Fix login","priority":2}"#).expect("record");
    assert_eq!(record.status, "in_progress");
    assert_eq!(record.extra["title"], "Fix login");
    assert_eq!(recovery_template_for(Some(record.status.as_str())), TEMPLATE_RESUME);
}

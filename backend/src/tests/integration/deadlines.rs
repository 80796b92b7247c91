use chrono::Duration;
use quoteflow_shared::{DeadlineStatus, UserRole};
use uuid::Uuid;

use crate::automation::actions::CreateNotificationParams;
use crate::automation::{Action, AutomationRule, EntityType, TriggerType};
use crate::clock::Clock;
use crate::jobs::scheduler::{DEADLINE_CHECK_JOB, WORKLOAD_CHECK_JOB};
use crate::jobs::JobStatus;
use crate::tests::{fixtures::*, test_start, TestContext};

/// Notifies the entity's assignee on every deadline trigger
fn reminder_rule() -> AutomationRule {
    AutomationRule::new("Deadline reminder", TriggerType::DeadlineApproaching, test_start()).with_actions(vec![
        Action::CreateNotification(CreateNotificationParams {
            user_id: None,
            title: "Deadline".into(),
            message: "A deadline needs attention".into(),
            notification_type: "DEADLINE".into(),
        }),
    ])
}

async fn assigned_inquiry(ctx: &TestContext) -> (Uuid, Uuid) {
    let owner = user(UserRole::Sales);
    let mut inquiry = inquiry();
    inquiry.assigned_to_id = Some(owner.id);
    ctx.store.add_user(owner.clone()).await;
    ctx.store.add_inquiry(inquiry.clone()).await;
    (inquiry.id, owner.id)
}

#[tokio::test]
async fn test_deadline_lifecycle_fires_each_reminder_once() {
    let ctx = TestContext::new().await;
    let (inquiry_id, owner_id) = assigned_inquiry(&ctx).await;
    ctx.add_rule(reminder_rule()).await;

    let tracker = ctx.tracker();
    tracker
        .create_deadline(EntityType::Inquiry, inquiry_id, test_start() + Duration::days(5), 3, 1)
        .await
        .unwrap();

    // before the warning date nothing happens
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.deadlines_checked, 1);
    assert_eq!((result.warnings, result.escalations, result.overdue), (0, 0, 0));
    assert!(ctx.store.notifications().await.is_empty());

    // past the warning date: exactly one warning
    ctx.clock.advance(Duration::days(2) + Duration::hours(1));
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.warnings, 1);
    assert_eq!(ctx.store.deadlines().await[0].reminders_sent, 1);

    let notifications = ctx.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, owner_id);
    assert_eq!(notifications[0].data["isWarning"], true);
    assert_eq!(notifications[0].data["daysUntilDue"], 3);
    assert_eq!(notifications[0].data["entityType"], "inquiry");

    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.warnings, 0);
    assert_eq!(ctx.store.notifications().await.len(), 1);

    // past the escalation date
    ctx.clock.advance(Duration::days(2));
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.escalations, 1);
    assert_eq!(ctx.store.deadlines().await[0].reminders_sent, 2);
    assert_eq!(ctx.store.notifications().await[1].data["isEscalation"], true);

    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.escalations, 0);

    // past due
    ctx.clock.advance(Duration::days(1));
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.overdue, 1);
    assert_eq!(ctx.store.deadlines().await[0].status, DeadlineStatus::Overdue);

    let notifications = ctx.store.notifications().await;
    assert_eq!(notifications.len(), 3);
    assert_eq!(notifications[2].data["isOverdue"], true);
    assert_eq!(notifications[2].data["daysOverdue"], 1);

    // overdue deadlines are no longer active
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.deadlines_checked, 0);
}

#[tokio::test]
async fn test_late_first_check_goes_straight_to_escalation() {
    let ctx = TestContext::new().await;
    let (inquiry_id, _) = assigned_inquiry(&ctx).await;
    ctx.add_rule(reminder_rule()).await;

    let tracker = ctx.tracker();
    tracker
        .create_deadline(EntityType::Inquiry, inquiry_id, test_start() + Duration::days(2), 3, 1)
        .await
        .unwrap();

    ctx.clock.advance(Duration::days(1) + Duration::hours(12));
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();

    assert_eq!((result.warnings, result.escalations), (0, 1));
    assert_eq!(ctx.store.deadlines().await[0].reminders_sent, 2);
}

#[tokio::test]
async fn test_complete_deadline_is_idempotent() {
    let ctx = TestContext::new().await;
    let (inquiry_id, _) = assigned_inquiry(&ctx).await;

    let tracker = ctx.tracker();
    tracker
        .create_deadline(EntityType::Inquiry, inquiry_id, test_start() + Duration::days(1), 3, 1)
        .await
        .unwrap();

    assert_eq!(tracker.complete_deadline(EntityType::Inquiry, inquiry_id).await.unwrap(), 1);
    assert_eq!(tracker.complete_deadline(EntityType::Inquiry, inquiry_id).await.unwrap(), 0);
    assert_eq!(tracker.complete_deadline(EntityType::Quote, Uuid::new_v4()).await.unwrap(), 0);

    let deadline = &ctx.store.deadlines().await[0];
    assert_eq!(deadline.status, DeadlineStatus::Completed);
    assert_eq!(deadline.completed_at, Some(test_start()));

    ctx.clock.advance(Duration::days(3));
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(result.deadlines_checked, 0);
}

#[tokio::test]
async fn test_rescheduling_rearms_the_deadline() {
    let ctx = TestContext::new().await;
    let (inquiry_id, _) = assigned_inquiry(&ctx).await;

    let tracker = ctx.tracker();
    tracker
        .create_deadline(EntityType::Inquiry, inquiry_id, test_start() + Duration::days(1), 3, 1)
        .await
        .unwrap();
    ctx.clock.advance(Duration::days(2));
    tracker.check_deadlines(ctx.engine()).await.unwrap();
    assert_eq!(ctx.store.deadlines().await[0].status, DeadlineStatus::Overdue);

    let new_due = ctx.clock.now() + Duration::days(7);
    let rearmed = tracker
        .create_deadline(EntityType::Inquiry, inquiry_id, new_due, 3, 1)
        .await
        .unwrap();

    let deadlines = ctx.store.deadlines().await;
    assert_eq!(deadlines.len(), 1);
    assert_eq!(rearmed.id, deadlines[0].id);
    assert_eq!(deadlines[0].status, DeadlineStatus::Active);
    assert_eq!(deadlines[0].reminders_sent, 0);
    assert_eq!(deadlines[0].due_date, new_due);
}

#[tokio::test]
async fn test_missing_entity_is_reported_without_stopping_the_check() {
    let ctx = TestContext::new().await;
    let (inquiry_id, _) = assigned_inquiry(&ctx).await;
    ctx.add_rule(reminder_rule()).await;

    let tracker = ctx.tracker();
    let orphan = Uuid::new_v4();
    tracker
        .create_deadline(EntityType::Inquiry, orphan, test_start() + Duration::days(1), 3, 1)
        .await
        .unwrap();
    tracker
        .create_deadline(EntityType::Inquiry, inquiry_id, test_start() + Duration::days(2), 3, 1)
        .await
        .unwrap();

    ctx.clock.advance(Duration::days(3));
    let result = tracker.check_deadlines(ctx.engine()).await.unwrap();

    assert_eq!(result.deadlines_checked, 2);
    assert_eq!(result.overdue, 1);
    assert_eq!(result.errors.len(), 1);

    // the failed deadline was left untouched
    let deadlines = ctx.store.deadlines().await;
    let orphaned = deadlines.iter().find(|d| d.entity_id == orphan).unwrap();
    assert_eq!(orphaned.status, DeadlineStatus::Active);
}

#[tokio::test]
async fn test_run_deadline_job_now_records_execution() {
    let ctx = TestContext::new().await;
    let (inquiry_id, _) = assigned_inquiry(&ctx).await;
    ctx.tracker()
        .create_deadline(EntityType::Inquiry, inquiry_id, test_start() + Duration::days(1), 3, 1)
        .await
        .unwrap();
    ctx.clock.advance(Duration::hours(12));

    let log = ctx.state.scheduler.run_job_now(DEADLINE_CHECK_JOB).await.unwrap();

    assert_eq!(log.job_name, DEADLINE_CHECK_JOB);
    assert_eq!(log.status, JobStatus::Completed);
    assert_eq!(log.items_processed, 1);
    assert_eq!(log.started_at, ctx.clock.now());
    assert_eq!(log.completed_at, Some(ctx.clock.now()));
    assert_eq!(log.duration_ms, Some(0));
    assert_eq!(ctx.state.scheduler.get_execution_logs().await.len(), 1);
    assert_eq!(ctx.store.deadlines().await[0].reminders_sent, 2);
}

#[tokio::test]
async fn test_run_unknown_job_is_rejected() {
    let ctx = TestContext::new().await;

    assert!(ctx.state.scheduler.run_job_now("nightly_backup").await.is_err());
    assert!(ctx.state.scheduler.get_execution_logs().await.is_empty());

    let log = ctx.state.scheduler.run_job_now(WORKLOAD_CHECK_JOB).await.unwrap();
    assert_eq!(log.items_processed, 0);
}

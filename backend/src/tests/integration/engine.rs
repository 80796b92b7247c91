use quoteflow_shared::{LogStatus, UserRole};
use serde_json::json;
use uuid::Uuid;

use crate::automation::actions::{CreateNotificationParams, SendEmailParams};
use crate::automation::{
    Action, AutomationRule, Condition, ConditionOperator, EmailRecipients, EntityType, LogicOperator,
    RuleExecution, TriggerType,
};
use crate::store::TemplateStore;
use crate::tests::{fixtures::*, test_start, TestContext};

fn rule(name: &str, trigger: TriggerType) -> AutomationRule {
    AutomationRule::new(name, trigger, test_start())
}

#[tokio::test]
async fn test_item_assigned_rule_updates_item_status() {
    let ctx = TestContext::new().await;
    let (_, item) = insert_inquiry_with_item(&ctx.store).await;
    let stored = ctx
        .add_rule(
            rule("Mark assigned", TriggerType::ItemAssigned)
                .with_conditions(vec![Condition::equals("status", json!("PENDING"))])
                .with_actions(vec![Action::update_status(EntityType::InquiryItem, "ASSIGNED")]),
        )
        .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::ItemAssigned,
            json!({ "status": "PENDING", "inquiryItemId": item.id }),
        ))
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].executed_actions.len(), 1);
    assert_eq!(results[0].message, "Executed 1 action(s)");
    assert_eq!(ctx.store.item(item.id).await.unwrap().status, "ASSIGNED");

    let logs = ctx.store.logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].rule_id, stored.id);
    assert_eq!(logs[0].status, LogStatus::Success);
    assert_eq!(logs[0].trigger, "ITEM_ASSIGNED");
    assert_eq!(logs[0].context["status"], "PENDING");
}

#[tokio::test]
async fn test_balanced_assignment_picks_lighter_user() {
    let ctx = TestContext::new().await;
    let busy = user(UserRole::Tech);
    let light = user(UserRole::Tech);
    ctx.store.add_user(busy.clone()).await;
    ctx.store.add_user(light.clone()).await;
    insert_open_items(&ctx.store, busy.id, 3).await;
    insert_open_items(&ctx.store, light.id, 1).await;
    let (inquiry, _) = insert_inquiry_with_item(&ctx.store).await;

    ctx.add_rule(
        rule("Route to tech", TriggerType::InquiryCreated)
            .with_actions(vec![Action::assign_to_role(EntityType::Inquiry, UserRole::Tech, true)]),
    )
    .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::InquiryCreated,
            json!({ "inquiryId": inquiry.id }),
        ))
        .await;

    assert!(results[0].success);
    assert_eq!(ctx.store.inquiry(inquiry.id).await.unwrap().assigned_to_id, Some(light.id));
}

#[tokio::test]
async fn test_rules_run_by_priority_then_insertion_order() {
    let ctx = TestContext::new().await;
    ctx.add_rule(rule("low", TriggerType::QuoteCreated).with_priority(1).with_actions(vec![Action::escalate(None)]))
        .await;
    ctx.add_rule(rule("tie-a", TriggerType::QuoteCreated).with_priority(5).with_actions(vec![Action::escalate(None)]))
        .await;
    ctx.add_rule(rule("high", TriggerType::QuoteCreated).with_priority(10).with_actions(vec![Action::escalate(None)]))
        .await;
    ctx.add_rule(rule("tie-b", TriggerType::QuoteCreated).with_priority(5).with_actions(vec![Action::escalate(None)]))
        .await;

    let names: Vec<String> = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(TriggerType::QuoteCreated, json!({})))
        .await
        .into_iter()
        .map(|r| r.rule_name)
        .collect();

    assert_eq!(names, vec!["high", "tie-a", "tie-b", "low"]);
}

#[tokio::test]
async fn test_inactive_and_other_trigger_rules_are_skipped() {
    let ctx = TestContext::new().await;
    ctx.add_rule(rule("off", TriggerType::QuoteCreated).inactive().with_actions(vec![Action::escalate(None)]))
        .await;
    ctx.add_rule(rule("elsewhere", TriggerType::InquiryCreated).with_actions(vec![Action::escalate(None)]))
        .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(TriggerType::QuoteCreated, json!({})))
        .await;

    assert!(results.is_empty());
    assert!(ctx.store.logs().await.is_empty());
}

#[tokio::test]
async fn test_unmet_conditions_still_logged_as_success() {
    let ctx = TestContext::new().await;
    ctx.add_rule(
        rule("Only urgent", TriggerType::InquiryCreated)
            .with_conditions(vec![Condition::equals("priority", json!("URGENT"))])
            .with_actions(vec![Action::escalate(None)]),
    )
    .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::InquiryCreated,
            json!({ "priority": "LOW" }),
        ))
        .await;

    assert!(results[0].success);
    assert!(results[0].executed_actions.is_empty());
    assert_eq!(results[0].message, "Conditions not met");

    let logs = ctx.store.logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, LogStatus::Success);
    assert_eq!(logs[0].actions_executed, json!([]));
}

#[tokio::test]
async fn test_failing_rule_does_not_stop_later_rules() {
    let ctx = TestContext::new().await;
    let manager = user(UserRole::Manager);
    ctx.store.add_user(manager.clone()).await;
    let (inquiry, _) = insert_inquiry_with_item(&ctx.store).await;

    ctx.add_rule(
        rule("Needs a VP", TriggerType::InquiryCreated)
            .with_priority(10)
            .with_actions(vec![Action::assign_to_role(EntityType::Inquiry, UserRole::Vp, false)]),
    )
    .await;
    ctx.add_rule(rule("Escalate", TriggerType::InquiryCreated).with_actions(vec![Action::escalate(None)]))
        .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::InquiryCreated,
            json!({ "inquiryId": inquiry.id }),
        ))
        .await;

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert_eq!(results[0].message, "Rule execution failed");
    assert_eq!(results[0].executed_actions.len(), 1);
    assert!(results[0].error.as_deref().unwrap().contains("No active users"));
    assert!(results[1].success);
    assert_eq!(ctx.store.notifications().await.len(), 1);

    let statuses: Vec<LogStatus> = ctx.store.logs().await.into_iter().map(|l| l.status).collect();
    assert_eq!(statuses, vec![LogStatus::Failed, LogStatus::Success]);
}

#[tokio::test]
async fn test_failed_action_aborts_remaining_actions() {
    let ctx = TestContext::new().await;
    let assignee = user(UserRole::Sales);
    ctx.store.add_user(assignee.clone()).await;

    ctx.add_rule(rule("Broken", TriggerType::QuoteCreated).with_actions(vec![
        Action::update_status(EntityType::Quote, "SENT"),
        Action::create_notification(Some(assignee.id), "Quote sent", "Done"),
    ]))
    .await;

    // no quoteId in context, so the status update cannot resolve its target
    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(TriggerType::QuoteCreated, json!({})))
        .await;

    assert!(!results[0].success);
    assert_eq!(results[0].executed_actions, vec![Action::update_status(EntityType::Quote, "SENT")]);
    assert!(ctx.store.notifications().await.is_empty());
}

#[tokio::test]
async fn test_later_rules_see_trigger_time_context() {
    let ctx = TestContext::new().await;
    let (_, item) = insert_inquiry_with_item(&ctx.store).await;
    let watcher = user(UserRole::Tech);
    ctx.store.add_user(watcher.clone()).await;

    ctx.add_rule(
        rule("Assign", TriggerType::ItemAssigned)
            .with_priority(2)
            .with_actions(vec![Action::update_status(EntityType::InquiryItem, "ASSIGNED")]),
    )
    .await;
    ctx.add_rule(
        rule("Notify while pending", TriggerType::ItemAssigned)
            .with_priority(1)
            .with_conditions(vec![Condition::equals("status", json!("PENDING"))])
            .with_actions(vec![Action::create_notification(Some(watcher.id), "Pending", "Still pending")]),
    )
    .await;

    ctx.engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::ItemAssigned,
            json!({ "status": "PENDING", "inquiryItemId": item.id }),
        ))
        .await;

    assert_eq!(ctx.store.item(item.id).await.unwrap().status, "ASSIGNED");
    assert_eq!(ctx.store.notifications().await.len(), 1);
}

#[tokio::test]
async fn test_or_conditions_fold_left_to_right() {
    let ctx = TestContext::new().await;
    let target = user(UserRole::Sales);
    ctx.store.add_user(target.clone()).await;

    let mut high_priority = Condition::equals("priority", json!("HIGH"));
    high_priority.logic = LogicOperator::Or;
    ctx.add_rule(
        rule("Big or urgent", TriggerType::CostCalculated)
            .with_conditions(vec![
                high_priority,
                Condition::new("totalCost", ConditionOperator::GreaterThan, json!(10000)),
            ])
            .with_actions(vec![Action::create_notification(Some(target.id), "Review", "Check the numbers")]),
    )
    .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::CostCalculated,
            json!({ "priority": "LOW", "totalCost": 25000.5 }),
        ))
        .await;

    assert_eq!(results[0].executed_actions.len(), 1);
    assert_eq!(ctx.store.notifications().await[0].title, "Review");
}

#[tokio::test]
async fn test_malformed_in_condition_fails_the_rule() {
    let ctx = TestContext::new().await;
    ctx.add_rule(
        rule("Bad list", TriggerType::InquiryCreated)
            .with_conditions(vec![Condition::new("priority", ConditionOperator::In, json!("HIGH"))])
            .with_actions(vec![Action::escalate(None)]),
    )
    .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::InquiryCreated,
            json!({ "priority": "HIGH" }),
        ))
        .await;

    assert!(!results[0].success);
    assert!(results[0].executed_actions.is_empty());
    assert_eq!(ctx.store.logs().await[0].status, LogStatus::Failed);
}

#[tokio::test]
async fn test_send_email_prefers_context_over_variables() {
    let ctx = TestContext::new().await;
    ctx.store
        .upsert_template(&template("note", "{{title}}", "<p>{{title}} for {{owner}}</p>"))
        .await
        .unwrap();

    let mut variables = serde_json::Map::new();
    variables.insert("title".into(), json!("from rule"));
    variables.insert("owner".into(), json!("Sales"));
    ctx.add_rule(rule("Email", TriggerType::InquiryCreated).with_actions(vec![Action::SendEmail(
        SendEmailParams {
            to: EmailRecipients::Many(vec!["a@example.com".into(), "b@example.com".into()]),
            template_name: "note".into(),
            variables,
        },
    )]))
    .await;

    ctx.engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::InquiryCreated,
            json!({ "title": "from context" }),
        ))
        .await;

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, "a@example.com");
    assert_eq!(sent[1].to, "b@example.com");
    assert_eq!(sent[0].subject, "from context");
    assert_eq!(sent[0].html_body, "<p>from context for Sales</p>");
}

#[tokio::test]
async fn test_send_email_resolves_assignee_and_managers() {
    let ctx = TestContext::new().await;
    ctx.seed_templates().await;
    let assignee = user(UserRole::Tech);
    let manager = user(UserRole::Manager);
    let mut former = user(UserRole::Manager);
    former.is_active = false;
    for u in [&assignee, &manager, &former] {
        ctx.store.add_user(u.clone()).await;
    }

    ctx.add_rule(rule("Tell everyone", TriggerType::ItemAssigned).with_actions(vec![
        Action::send_email(EmailRecipients::One("assignee".into()), "inquiry_assigned"),
        Action::send_email(EmailRecipients::One("managers".into()), "status_changed"),
    ]))
    .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::ItemAssigned,
            json!({ "assignedToId": assignee.id, "inquiryTitle": "Brackets", "assigneeName": assignee.name }),
        ))
        .await;

    assert!(results[0].success);
    let recipients: Vec<String> = ctx.mailer.sent().into_iter().map(|e| e.to).collect();
    assert_eq!(recipients, vec![assignee.email.clone(), manager.email.clone()]);
    assert!(ctx.mailer.sent()[0].subject.contains("Brackets"));
}

#[tokio::test]
async fn test_send_email_without_recipients_is_skipped() {
    let ctx = TestContext::new().await;
    ctx.seed_templates().await;
    ctx.add_rule(
        rule("Nobody assigned", TriggerType::InquiryCreated)
            .with_actions(vec![Action::send_email(EmailRecipients::One("assignee".into()), "inquiry_assigned")]),
    )
    .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::InquiryCreated,
            json!({ "assignedToId": null }),
        ))
        .await;

    assert!(results[0].success);
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_notification_falls_back_to_context_assignee() {
    let ctx = TestContext::new().await;
    let assignee = user(UserRole::Tech);
    ctx.store.add_user(assignee.clone()).await;

    ctx.add_rule(rule("Ping", TriggerType::ItemAssigned).with_actions(vec![Action::CreateNotification(
        CreateNotificationParams {
            user_id: None,
            title: "New work".into(),
            message: "An item was assigned to you".into(),
            notification_type: "ASSIGNMENT".into(),
        },
    )]))
    .await;

    ctx.engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::ItemAssigned,
            json!({ "assignedToId": assignee.id, "itemName": "Flange" }),
        ))
        .await;

    let notifications = ctx.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, assignee.id);
    assert_eq!(notifications[0].notification_type, "ASSIGNMENT");
    assert_eq!(notifications[0].data["itemName"], "Flange");
    assert!(!notifications[0].read);
}

#[tokio::test]
async fn test_escalate_notifies_every_active_manager() {
    let ctx = TestContext::new().await;
    let managers = [user(UserRole::Manager), user(UserRole::Manager)];
    for manager in &managers {
        ctx.store.add_user(manager.clone()).await;
    }
    ctx.store.add_user(user(UserRole::Sales)).await;

    ctx.add_rule(
        rule("Escalate", TriggerType::ApprovalRequired)
            .with_actions(vec![Action::escalate(Some("Approval is stuck"))]),
    )
    .await;

    ctx.engine()
        .execute_rules_for_trigger(RuleExecution::new(TriggerType::ApprovalRequired, json!({})))
        .await;

    let notifications = ctx.store.notifications().await;
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n.notification_type == "ESCALATION"));
    assert!(notifications.iter().all(|n| n.message == "Approval is stuck"));
    let notified: Vec<Uuid> = notifications.iter().map(|n| n.user_id).collect();
    assert!(managers.iter().all(|m| notified.contains(&m.id)));
}

#[tokio::test]
async fn test_create_deadline_action_schedules_from_now() {
    let ctx = TestContext::new().await;
    let (inquiry, _) = insert_inquiry_with_item(&ctx.store).await;

    ctx.add_rule(
        rule("Five day SLA", TriggerType::InquiryCreated)
            .with_actions(vec![Action::create_deadline(EntityType::Inquiry, 5)]),
    )
    .await;

    ctx.engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::InquiryCreated,
            json!({ "inquiryId": inquiry.id }),
        ))
        .await;

    let deadlines = ctx.store.deadlines().await;
    assert_eq!(deadlines.len(), 1);
    assert_eq!(deadlines[0].entity_id, inquiry.id);
    assert_eq!(deadlines[0].due_date, test_start() + chrono::Duration::days(5));
    assert_eq!(deadlines[0].warning_date, test_start() + chrono::Duration::days(2));
    assert_eq!(deadlines[0].escalation_date, test_start() + chrono::Duration::days(4));
}

#[tokio::test]
async fn test_assign_quote_is_rejected() {
    let ctx = TestContext::new().await;
    let seller = user(UserRole::Sales);
    ctx.store.add_user(seller.clone()).await;

    ctx.add_rule(
        rule("Assign quote", TriggerType::QuoteCreated)
            .with_actions(vec![Action::assign_to_user(EntityType::Quote, seller.id)]),
    )
    .await;

    let results = ctx
        .engine()
        .execute_rules_for_trigger(RuleExecution::new(
            TriggerType::QuoteCreated,
            json!({ "quoteId": Uuid::new_v4() }),
        ))
        .await;

    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("does not support"));
}

#[tokio::test]
async fn test_execution_user_recorded_in_log() {
    let ctx = TestContext::new().await;
    let actor = Uuid::new_v4();
    ctx.add_rule(rule("Audit", TriggerType::QuoteCreated).with_actions(vec![Action::escalate(None)]))
        .await;

    ctx.engine()
        .execute_rules_for_trigger(
            RuleExecution::new(TriggerType::QuoteCreated, json!({})).with_user(Some(actor)),
        )
        .await;

    assert_eq!(ctx.store.logs().await[0].user_id, Some(actor));
}

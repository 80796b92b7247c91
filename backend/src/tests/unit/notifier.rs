use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use crate::automation::AutomationError;
use crate::services::{EmailNotification, EmailNotifier, MailTransport};
use crate::store::{MemoryStore, TemplateStore};
use crate::tests::fixtures::*;

fn variables(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn notification(template_name: &str, vars: Value) -> EmailNotification {
    EmailNotification {
        to: "planner@example.com".to_string(),
        template_name: template_name.to_string(),
        variables: variables(vars),
    }
}

async fn store_with_template() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .upsert_template(&template(
            "greeting",
            "Hello {{name}}",
            "<p>{{name}}, see {{appUrl}}/inquiries/{{inquiryId}}</p>",
        ))
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_sends_rendered_email_through_transport() {
    let store = store_with_template().await;
    let mailer = Arc::new(RecordingTransport::default());
    let transport: Arc<dyn MailTransport> = mailer.clone();
    let notifier = EmailNotifier::new(Arc::new(store), Some(transport)).with_app_url("https://app.test");

    assert_ok!(
        notifier
            .send_email_notification(&notification("greeting", json!({ "name": "Ada", "inquiryId": 7 })))
            .await
    );

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "planner@example.com");
    assert_eq!(sent[0].subject, "Hello Ada");
    assert_eq!(sent[0].html_body, "<p>Ada, see https://app.test/inquiries/7</p>");
}

#[tokio::test]
async fn test_caller_app_url_wins() {
    let store = store_with_template().await;
    let mailer = Arc::new(RecordingTransport::default());
    let transport: Arc<dyn MailTransport> = mailer.clone();
    let notifier = EmailNotifier::new(Arc::new(store), Some(transport)).with_app_url("https://app.test");

    notifier
        .send_email_notification(&notification(
            "greeting",
            json!({ "name": "Ada", "inquiryId": 7, "appUrl": "https://other.test" }),
        ))
        .await
        .unwrap();

    assert!(mailer.sent()[0].html_body.contains("https://other.test/inquiries/7"));
}

#[tokio::test]
async fn test_without_transport_email_is_only_logged() {
    let store = store_with_template().await;
    let notifier = EmailNotifier::new(Arc::new(store), None);

    assert!(!notifier.is_configured());
    assert_ok!(
        notifier
            .send_email_notification(&notification("greeting", json!({ "name": "Ada" })))
            .await
    );
}

#[tokio::test]
async fn test_missing_template_is_an_error() {
    let notifier = EmailNotifier::new(Arc::new(MemoryStore::new()), None);

    let result = notifier
        .send_email_notification(&notification("nope", json!({})))
        .await;

    assert!(matches!(result, Err(AutomationError::TemplateNotFound(name)) if name == "nope"));
}

#[tokio::test]
async fn test_inactive_template_is_not_used() {
    let store = MemoryStore::new();
    let mut disabled = template("greeting", "Hello", "<p>Hi</p>");
    disabled.is_active = false;
    store.upsert_template(&disabled).await.unwrap();
    let notifier = EmailNotifier::new(Arc::new(store), None);

    assert_err!(
        notifier
            .send_email_notification(&notification("greeting", json!({})))
            .await
    );
}

#[tokio::test]
async fn test_transport_failure_is_reported() {
    let store = store_with_template().await;
    let mailer = Arc::new(RecordingTransport::default());
    mailer.fail_with_smtp_error();
    let transport: Arc<dyn MailTransport> = mailer.clone();
    let notifier = EmailNotifier::new(Arc::new(store), Some(transport));

    let result = notifier
        .send_email_notification(&notification("greeting", json!({ "name": "Ada" })))
        .await;

    assert!(matches!(result, Err(AutomationError::Email(_))));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_default_templates_seed_is_idempotent() {
    let store = MemoryStore::new();
    let notifier = EmailNotifier::new(Arc::new(store.clone()), None);

    assert_eq!(notifier.create_default_email_templates().await.unwrap(), 4);
    assert_eq!(notifier.create_default_email_templates().await.unwrap(), 4);

    let templates = store.list_templates().await.unwrap();
    assert_eq!(templates.len(), 4);
    assert!(templates.iter().any(|t| t.name == "deadline_reminder"));
}

// Email Notifier - Template rendering and dispatch for automation emails

use quoteflow_shared::EmailTemplate;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::email::{MailTransport, OutgoingEmail};
use crate::automation::coerce::to_display_string;
use crate::automation::{AutomationError, AutomationResult};
use crate::store::TemplateStore;

/// Request to send one templated email
#[derive(Debug, Clone)]
pub struct EmailNotification {
    pub to: String,
    pub template_name: String,
    pub variables: Map<String, Value>,
}

pub struct EmailNotifier {
    templates: Arc<dyn TemplateStore>,
    transport: Option<Arc<dyn MailTransport>>,
    app_url: Option<String>,
}

impl EmailNotifier {
    /// Without a transport every email is written to the log instead of sent.
    pub fn new(templates: Arc<dyn TemplateStore>, transport: Option<Arc<dyn MailTransport>>) -> Self {
        Self {
            templates,
            transport,
            app_url: None,
        }
    }

    pub fn with_app_url(mut self, app_url: impl Into<String>) -> Self {
        self.app_url = Some(app_url.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn send_email_notification(&self, notification: &EmailNotification) -> AutomationResult<()> {
        let template = self
            .templates
            .active_template(&notification.template_name)
            .await?
            .ok_or_else(|| AutomationError::TemplateNotFound(notification.template_name.clone()))?;

        let mut variables = notification.variables.clone();
        if let Some(app_url) = &self.app_url {
            variables
                .entry("appUrl")
                .or_insert_with(|| Value::String(app_url.clone()));
        }

        let email = render(&template, &notification.to, &variables);

        match &self.transport {
            Some(transport) => transport
                .send(&email)
                .await
                .map_err(|e| AutomationError::Email(e.to_string())),
            None => {
                info!(
                    to = %email.to,
                    subject = %email.subject,
                    body = %email.text_body.as_deref().unwrap_or(&email.html_body),
                    "Email transport not configured, logging email instead of sending"
                );
                Ok(())
            }
        }
    }

    /// Upserts the built-in templates. Safe to run on every startup.
    pub async fn create_default_email_templates(&self) -> AutomationResult<usize> {
        let defaults = default_templates();
        for template in &defaults {
            self.templates.upsert_template(template).await?;
        }
        info!("Seeded {} default email templates", defaults.len());
        Ok(defaults.len())
    }
}

/// Replace every `{{key}}` with the variable's string form. No escaping;
/// placeholders without a variable are left as they are.
pub fn render_text(text: &str, variables: &Map<String, Value>) -> String {
    let mut rendered = text.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{{{key}}}}}");
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, &to_display_string(Some(value)));
        }
    }
    rendered
}

pub fn render(template: &EmailTemplate, to: &str, variables: &Map<String, Value>) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: render_text(&template.subject, variables),
        html_body: render_text(&template.html_content, variables),
        text_body: template
            .text_content
            .as_deref()
            .map(|text| render_text(text, variables)),
    }
}

fn template(name: &str, subject: &str, html: &str, text: &str, variables: &[&str]) -> EmailTemplate {
    EmailTemplate {
        id: Uuid::new_v4(),
        name: name.to_string(),
        subject: subject.to_string(),
        html_content: html.to_string(),
        text_content: Some(text.to_string()),
        variables: variables.iter().map(|v| v.to_string()).collect(),
        is_active: true,
    }
}

pub fn default_templates() -> Vec<EmailTemplate> {
    vec![
        template(
            "inquiry_assigned",
            "New inquiry assigned: {{inquiryTitle}}",
            r#"<h2>New inquiry assigned</h2>
<p>Hello {{assigneeName}},</p>
<p>The inquiry <strong>{{inquiryTitle}}</strong> from {{customerName}} has been assigned to you.</p>
<p><a href="{{appUrl}}/inquiries/{{inquiryId}}">Open inquiry</a></p>"#,
            "Hello {{assigneeName}},\n\nThe inquiry \"{{inquiryTitle}}\" from {{customerName}} has been assigned to you.\n\n{{appUrl}}/inquiries/{{inquiryId}}",
            &["assigneeName", "inquiryTitle", "customerName", "inquiryId", "appUrl"],
        ),
        template(
            "cost_approval_required",
            "Cost approval required: {{itemName}}",
            r#"<h2>Cost approval required</h2>
<p>A cost calculation for <strong>{{itemName}}</strong> ({{inquiryTitle}}) is waiting for approval.</p>
<p>Total cost: {{totalCost}}</p>
<p><a href="{{appUrl}}/approvals">Review approvals</a></p>"#,
            "A cost calculation for {{itemName}} ({{inquiryTitle}}) is waiting for approval.\nTotal cost: {{totalCost}}\n\n{{appUrl}}/approvals",
            &["itemName", "inquiryTitle", "totalCost", "appUrl"],
        ),
        template(
            "deadline_reminder",
            "Deadline reminder: {{entityType}} due {{dueDate}}",
            r#"<h2>Deadline reminder</h2>
<p>The {{entityType}} <strong>{{inquiryTitle}}</strong> for {{customerName}} is due on {{dueDate}}.</p>
<p>Days until due: {{daysUntilDue}}</p>"#,
            "The {{entityType}} \"{{inquiryTitle}}\" for {{customerName}} is due on {{dueDate}}.\nDays until due: {{daysUntilDue}}",
            &["entityType", "inquiryTitle", "customerName", "dueDate", "daysUntilDue"],
        ),
        template(
            "status_changed",
            "Status changed: {{inquiryTitle}}",
            r#"<h2>Status changed</h2>
<p>The inquiry <strong>{{inquiryTitle}}</strong> moved from {{oldStatus}} to {{newStatus}}.</p>
<p><a href="{{appUrl}}/inquiries/{{inquiryId}}">Open inquiry</a></p>"#,
            "The inquiry \"{{inquiryTitle}}\" moved from {{oldStatus}} to {{newStatus}}.\n\n{{appUrl}}/inquiries/{{inquiryId}}",
            &["inquiryTitle", "oldStatus", "newStatus", "inquiryId", "appUrl"],
        ),
    ]
}

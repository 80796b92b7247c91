// Action Executor - Performs the side effects of a matched rule

use chrono::Duration;
use quoteflow_shared::{Notification, UserRole};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::{
    Action, AssignToRoleParams, AssignToUserParams, CreateDeadlineParams, CreateNotificationParams,
    EntityType, EscalateParams, RecipientTarget, SendEmailParams, UpdateStatusParams,
};
use super::coerce::lookup_path;
use super::error::{AutomationError, AutomationResult};
use super::triggers::RuleContext;
use super::workload::WorkloadBalancer;
use crate::clock::Clock;
use crate::jobs::deadline_tracker::{DeadlineTracker, DEFAULT_ESCALATION_DAYS, DEFAULT_WARNING_DAYS};
use crate::services::notifier::{EmailNotification, EmailNotifier};
use crate::store::DomainStore;

const ESCALATION_TITLE: &str = "Escalation required";
const ESCALATION_MESSAGE: &str = "An automation rule escalated an item that needs management attention.";

pub struct ActionExecutor {
    domain: Arc<dyn DomainStore>,
    notifier: Arc<EmailNotifier>,
    deadlines: Arc<DeadlineTracker>,
    balancer: Arc<dyn WorkloadBalancer>,
    clock: Arc<dyn Clock>,
}

impl ActionExecutor {
    pub fn new(
        domain: Arc<dyn DomainStore>,
        notifier: Arc<EmailNotifier>,
        deadlines: Arc<DeadlineTracker>,
        balancer: Arc<dyn WorkloadBalancer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            domain,
            notifier,
            deadlines,
            balancer,
            clock,
        }
    }

    pub async fn execute(&self, action: &Action, context: &RuleContext) -> AutomationResult<()> {
        match action {
            Action::AssignToUser(params) => self.assign_to_user(params, context).await,
            Action::AssignToRole(params) => self.assign_to_role(params, context).await,
            Action::SendEmail(params) => self.send_email(params, context).await,
            Action::CreateNotification(params) => self.create_notification(params, context).await,
            Action::UpdateStatus(params) => self.update_status(params, context).await,
            Action::CreateDeadline(params) => self.create_deadline(params, context).await,
            Action::Escalate(params) => self.escalate(params, context).await,
        }
    }

    async fn assign_to_user(&self, params: &AssignToUserParams, context: &RuleContext) -> AutomationResult<()> {
        ensure_assignable("ASSIGN_TO_USER", params.entity_type)?;
        let entity_id = resolve_entity_id(params.entity_type, params.entity_id, context)?;
        self.assign(params.entity_type, entity_id, params.user_id).await
    }

    async fn assign_to_role(&self, params: &AssignToRoleParams, context: &RuleContext) -> AutomationResult<()> {
        ensure_assignable("ASSIGN_TO_ROLE", params.entity_type)?;
        let entity_id = resolve_entity_id(params.entity_type, params.entity_id, context)?;
        let user = self
            .balancer
            .select_assignee(params.role, params.balance_workload)
            .await?;
        self.assign(params.entity_type, entity_id, user.id).await
    }

    async fn assign(&self, entity_type: EntityType, entity_id: Uuid, user_id: Uuid) -> AutomationResult<()> {
        self.domain.assign_entity(entity_type, entity_id, user_id).await?;
        info!(entity_type = %entity_type, entity_id = %entity_id, user_id = %user_id, "Entity assigned");
        Ok(())
    }

    async fn send_email(&self, params: &SendEmailParams, context: &RuleContext) -> AutomationResult<()> {
        let recipients = self.resolve_recipients(&params.to.target(), context).await?;
        if recipients.is_empty() {
            warn!(template = %params.template_name, "No email recipients resolved, skipping");
            return Ok(());
        }

        // Context keys override action variables of the same name.
        let mut variables = params.variables.clone();
        if let Value::Object(fields) = context {
            for (key, value) in fields {
                variables.insert(key.clone(), value.clone());
            }
        }

        for to in recipients {
            self.notifier
                .send_email_notification(&EmailNotification {
                    to,
                    template_name: params.template_name.clone(),
                    variables: variables.clone(),
                })
                .await?;
        }
        Ok(())
    }

    async fn resolve_recipients(
        &self,
        targets: &[RecipientTarget],
        context: &RuleContext,
    ) -> AutomationResult<Vec<String>> {
        let mut recipients = Vec::new();

        for target in targets {
            match target {
                RecipientTarget::Address(address) => recipients.push(address.clone()),
                RecipientTarget::Assignee => {
                    if let Some(user_id) = context_uuid(context, "assignedToId")? {
                        if let Some(user) = self.domain.get_user(user_id).await? {
                            recipients.push(user.email);
                        }
                    }
                }
                RecipientTarget::Managers => {
                    let managers = self.domain.active_users_with_role(UserRole::Manager).await?;
                    recipients.extend(managers.into_iter().map(|user| user.email));
                }
            }
        }

        Ok(recipients)
    }

    async fn create_notification(
        &self,
        params: &CreateNotificationParams,
        context: &RuleContext,
    ) -> AutomationResult<()> {
        let user_id = match params.user_id {
            Some(user_id) => user_id,
            None => context_uuid(context, "assignedToId")?
                .ok_or(AutomationError::MissingParameter("userId"))?,
        };

        self.notify(user_id, &params.title, &params.message, &params.notification_type, context)
            .await
    }

    async fn update_status(&self, params: &UpdateStatusParams, context: &RuleContext) -> AutomationResult<()> {
        let entity_id = resolve_entity_id(params.entity_type, params.entity_id, context)?;
        self.domain
            .update_entity_status(params.entity_type, entity_id, &params.status)
            .await?;
        info!(entity_type = %params.entity_type, entity_id = %entity_id, status = %params.status, "Status updated");
        Ok(())
    }

    async fn create_deadline(&self, params: &CreateDeadlineParams, context: &RuleContext) -> AutomationResult<()> {
        let entity_id = resolve_entity_id(params.entity_type, params.entity_id, context)?;
        let due_date = self.clock.now() + Duration::days(params.days_from_now);

        self.deadlines
            .create_deadline(
                params.entity_type,
                entity_id,
                due_date,
                params.warning_days.unwrap_or(DEFAULT_WARNING_DAYS),
                params.escalation_days.unwrap_or(DEFAULT_ESCALATION_DAYS),
            )
            .await?;
        Ok(())
    }

    async fn escalate(&self, params: &EscalateParams, context: &RuleContext) -> AutomationResult<()> {
        let title = params.title.as_deref().unwrap_or(ESCALATION_TITLE);
        let message = params.message.as_deref().unwrap_or(ESCALATION_MESSAGE);

        let managers = self.domain.active_users_with_role(UserRole::Manager).await?;
        if managers.is_empty() {
            warn!("Escalation requested but no active managers exist");
        }

        for manager in &managers {
            self.notify(manager.id, title, message, "ESCALATION", context).await?;
        }
        Ok(())
    }

    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        notification_type: &str,
        context: &RuleContext,
    ) -> AutomationResult<()> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            notification_type: notification_type.to_string(),
            data: context.clone(),
            read: false,
            created_at: self.clock.now(),
        };
        self.domain.create_notification(&notification).await?;
        Ok(())
    }
}

fn ensure_assignable(action: &'static str, entity_type: EntityType) -> AutomationResult<()> {
    if entity_type.supports_assignment() {
        Ok(())
    } else {
        Err(AutomationError::UnsupportedEntity {
            action,
            entity: entity_type,
        })
    }
}

/// Read an optional UUID from the context. Null and missing both mean absent.
fn context_uuid(context: &RuleContext, field: &str) -> AutomationResult<Option<Uuid>> {
    match lookup_path(context, field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| AutomationError::InvalidId {
                field: field.to_string(),
                value: raw.clone(),
            }),
        Some(other) => Err(AutomationError::InvalidId {
            field: field.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Explicit `entityId` wins; otherwise the entity's id field in the context.
fn resolve_entity_id(
    entity_type: EntityType,
    explicit: Option<Uuid>,
    context: &RuleContext,
) -> AutomationResult<Uuid> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    context_uuid(context, entity_type.context_id_field())?
        .ok_or(AutomationError::MissingParameter("entityId"))
}

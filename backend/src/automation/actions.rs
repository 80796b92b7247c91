// Automation Actions - Typed side effects a rule can perform
//
// Stored as `{ "type": "UPDATE_STATUS", "params": { ... } }` in the rule's
// JSON action list; each variant carries its own parameter set.

use quoteflow_shared::UserRole;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Domain entities an action or deadline can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Inquiry,
    InquiryItem,
    Quote,
    ProductionOrder,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inquiry => "inquiry",
            Self::InquiryItem => "inquiryItem",
            Self::Quote => "quote",
            Self::ProductionOrder => "productionOrder",
        }
    }

    /// Context key that carries this entity's id when `entityId` is omitted
    pub fn context_id_field(&self) -> &'static str {
        match self {
            Self::Inquiry => "inquiryId",
            Self::InquiryItem => "inquiryItemId",
            Self::Quote => "quoteId",
            Self::ProductionOrder => "productionOrderId",
        }
    }

    pub fn supports_assignment(&self) -> bool {
        matches!(self, Self::Inquiry | Self::InquiryItem)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inquiry" => Ok(Self::Inquiry),
            "inquiryItem" => Ok(Self::InquiryItem),
            "quote" => Ok(Self::Quote),
            "productionOrder" => Ok(Self::ProductionOrder),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignToUserParams {
    pub entity_type: EntityType,
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignToRoleParams {
    pub entity_type: EntityType,
    pub role: UserRole,
    #[serde(default)]
    pub balance_workload: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
}

/// `to` of a send-email action: a literal list, a literal address, or one of
/// the sentinels `assignee` / `managers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmailRecipients {
    Many(Vec<String>),
    One(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientTarget {
    Address(String),
    Assignee,
    Managers,
}

impl EmailRecipients {
    pub fn target(&self) -> Vec<RecipientTarget> {
        match self {
            Self::Many(list) => list.iter().cloned().map(RecipientTarget::Address).collect(),
            Self::One(s) if s == "assignee" => vec![RecipientTarget::Assignee],
            Self::One(s) if s == "managers" => vec![RecipientTarget::Managers],
            Self::One(s) => vec![RecipientTarget::Address(s.clone())],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailParams {
    pub to: EmailRecipients,
    pub template_name: String,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

fn default_notification_type() -> String {
    "AUTOMATION".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(default = "default_notification_type")]
    pub notification_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusParams {
    pub entity_type: EntityType,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeadlineParams {
    pub entity_type: EntityType,
    pub days_from_now: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_days: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An action executed by a rule whose conditions hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    AssignToUser(AssignToUserParams),
    AssignToRole(AssignToRoleParams),
    SendEmail(SendEmailParams),
    CreateNotification(CreateNotificationParams),
    UpdateStatus(UpdateStatusParams),
    CreateDeadline(CreateDeadlineParams),
    Escalate(EscalateParams),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssignToUser(_) => "ASSIGN_TO_USER",
            Self::AssignToRole(_) => "ASSIGN_TO_ROLE",
            Self::SendEmail(_) => "SEND_EMAIL",
            Self::CreateNotification(_) => "CREATE_NOTIFICATION",
            Self::UpdateStatus(_) => "UPDATE_STATUS",
            Self::CreateDeadline(_) => "CREATE_DEADLINE",
            Self::Escalate(_) => "ESCALATE",
        }
    }

    // ===== Builders =====

    pub fn assign_to_user(entity_type: EntityType, user_id: Uuid) -> Self {
        Self::AssignToUser(AssignToUserParams {
            entity_type,
            user_id,
            entity_id: None,
        })
    }

    pub fn assign_to_role(entity_type: EntityType, role: UserRole, balance_workload: bool) -> Self {
        Self::AssignToRole(AssignToRoleParams {
            entity_type,
            role,
            balance_workload,
            entity_id: None,
        })
    }

    pub fn send_email(to: EmailRecipients, template_name: &str) -> Self {
        Self::SendEmail(SendEmailParams {
            to,
            template_name: template_name.to_string(),
            variables: serde_json::Map::new(),
        })
    }

    pub fn create_notification(user_id: Option<Uuid>, title: &str, message: &str) -> Self {
        Self::CreateNotification(CreateNotificationParams {
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            notification_type: default_notification_type(),
        })
    }

    pub fn update_status(entity_type: EntityType, status: &str) -> Self {
        Self::UpdateStatus(UpdateStatusParams {
            entity_type,
            status: status.to_string(),
            entity_id: None,
        })
    }

    pub fn create_deadline(entity_type: EntityType, days_from_now: i64) -> Self {
        Self::CreateDeadline(CreateDeadlineParams {
            entity_type,
            days_from_now,
            entity_id: None,
            warning_days: None,
            escalation_days: None,
        })
    }

    pub fn escalate(message: Option<&str>) -> Self {
        Self::Escalate(EscalateParams {
            title: None,
            message: message.map(str::to_string),
        })
    }
}

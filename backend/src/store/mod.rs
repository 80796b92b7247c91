// Persistence seams for the automation subsystem.
//
// The engine, deadline tracker and notifier only talk to these traits.
// `PgStore` backs them with Postgres; `MemoryStore` keeps everything in
// process for tests and database-less development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quoteflow_shared::{AutomationLog, Deadline, EmailTemplate, Notification, User, UserRole};
use thiserror::Error;
use uuid::Uuid;

use crate::automation::{AutomationRule, EntityType, TriggerType};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Item statuses that no longer count towards a user's workload
pub const CLOSED_ITEM_STATUSES: [&str; 3] = ["COMPLETED", "CANCELLED", "REJECTED"];

/// Rule definitions and their execution audit trail
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules for a trigger, highest priority first; equal priorities
    /// keep creation order.
    async fn active_rules_for_trigger(&self, trigger: TriggerType) -> StoreResult<Vec<AutomationRule>>;
    async fn list_rules(&self) -> StoreResult<Vec<AutomationRule>>;
    async fn get_rule(&self, id: Uuid) -> StoreResult<Option<AutomationRule>>;
    async fn create_rule(&self, rule: &AutomationRule) -> StoreResult<()>;
    async fn update_rule(&self, rule: &AutomationRule) -> StoreResult<()>;
    async fn delete_rule(&self, id: Uuid) -> StoreResult<bool>;
    async fn insert_log(&self, log: &AutomationLog) -> StoreResult<()>;
    async fn list_logs(&self, rule_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<AutomationLog>>;
}

/// Users and the domain records actions write to
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn active_users(&self) -> StoreResult<Vec<User>>;
    async fn active_users_with_role(&self, role: UserRole) -> StoreResult<Vec<User>>;
    /// Open assigned inquiry items plus unapproved cost calculations
    async fn user_workload(&self, user_id: Uuid) -> StoreResult<i64>;
    async fn assign_entity(&self, entity_type: EntityType, entity_id: Uuid, user_id: Uuid) -> StoreResult<()>;
    async fn update_entity_status(&self, entity_type: EntityType, entity_id: Uuid, status: &str) -> StoreResult<()>;
    async fn create_notification(&self, notification: &Notification) -> StoreResult<()>;
    /// Display fields (titles, customer, assignee) used to enrich contexts
    async fn entity_details(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> StoreResult<serde_json::Map<String, serde_json::Value>>;
}

#[async_trait]
pub trait DeadlineStore: Send + Sync {
    /// Insert or re-arm the deadline keyed by (entity_type, entity_id).
    async fn upsert_deadline(&self, deadline: &Deadline) -> StoreResult<Deadline>;
    async fn active_deadlines(&self) -> StoreResult<Vec<Deadline>>;
    async fn mark_overdue(&self, id: Uuid) -> StoreResult<()>;
    /// Raise the reminder counter; never lowers it.
    async fn record_reminder(&self, id: Uuid, reminders_sent: i32) -> StoreResult<()>;
    /// Complete an ACTIVE or OVERDUE deadline. Returns the number of rows changed.
    async fn complete_deadline(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn active_template(&self, name: &str) -> StoreResult<Option<EmailTemplate>>;
    async fn list_templates(&self) -> StoreResult<Vec<EmailTemplate>>;
    /// Insert by name, or overwrite content of the existing template.
    async fn upsert_template(&self, template: &EmailTemplate) -> StoreResult<()>;
}

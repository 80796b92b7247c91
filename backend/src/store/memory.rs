// In-process store used by tests and by the server when no database is configured

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quoteflow_shared::{
    AutomationLog, CostCalculation, Deadline, DeadlineStatus, EmailTemplate, Inquiry, InquiryItem,
    Notification, ProductionOrder, Quote, User, UserRole,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    DeadlineStore, DomainStore, RuleStore, StoreError, StoreResult, TemplateStore,
    CLOSED_ITEM_STATUSES,
};
use crate::automation::{AutomationRule, EntityType, TriggerType};

#[derive(Debug, Default)]
struct MemoryState {
    // Vec keeps insertion order, which doubles as the priority tie-break
    rules: Vec<AutomationRule>,
    logs: Vec<AutomationLog>,
    users: Vec<User>,
    inquiries: Vec<Inquiry>,
    items: Vec<InquiryItem>,
    cost_calculations: Vec<CostCalculation>,
    quotes: Vec<Quote>,
    production_orders: Vec<ProductionOrder>,
    notifications: Vec<Notification>,
    deadlines: Vec<Deadline>,
    templates: Vec<EmailTemplate>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Seeding =====

    pub async fn add_user(&self, user: User) {
        self.state.write().await.users.push(user);
    }

    pub async fn add_inquiry(&self, inquiry: Inquiry) {
        self.state.write().await.inquiries.push(inquiry);
    }

    pub async fn add_item(&self, item: InquiryItem) {
        self.state.write().await.items.push(item);
    }

    pub async fn add_cost_calculation(&self, calculation: CostCalculation) {
        self.state.write().await.cost_calculations.push(calculation);
    }

    pub async fn add_quote(&self, quote: Quote) {
        self.state.write().await.quotes.push(quote);
    }

    pub async fn add_production_order(&self, order: ProductionOrder) {
        self.state.write().await.production_orders.push(order);
    }

    // ===== Inspection =====

    pub async fn inquiry(&self, id: Uuid) -> Option<Inquiry> {
        self.state.read().await.inquiries.iter().find(|i| i.id == id).cloned()
    }

    pub async fn item(&self, id: Uuid) -> Option<InquiryItem> {
        self.state.read().await.items.iter().find(|i| i.id == id).cloned()
    }

    pub async fn quote(&self, id: Uuid) -> Option<Quote> {
        self.state.read().await.quotes.iter().find(|q| q.id == id).cloned()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn logs(&self) -> Vec<AutomationLog> {
        self.state.read().await.logs.clone()
    }

    pub async fn deadlines(&self) -> Vec<Deadline> {
        self.state.read().await.deadlines.clone()
    }
}

fn not_found(entity_type: EntityType, id: Uuid) -> StoreError {
    StoreError::NotFound(format!("{entity_type} {id}"))
}

fn assignee_fields(state: &MemoryState, assigned_to_id: Option<Uuid>, out: &mut Map<String, Value>) {
    out.insert("assignedToId".into(), json!(assigned_to_id));
    let user = assigned_to_id.and_then(|id| state.users.iter().find(|u| u.id == id));
    out.insert("assignedToName".into(), json!(user.map(|u| u.name.clone())));
    out.insert("assignedToEmail".into(), json!(user.map(|u| u.email.clone())));
}

/// Writes the inquiry's display fields; `None` when the inquiry does not exist,
/// otherwise its assignee.
fn inquiry_fields(
    state: &MemoryState,
    inquiry_id: Uuid,
    out: &mut Map<String, Value>,
) -> Option<Option<Uuid>> {
    let inquiry = state.inquiries.iter().find(|i| i.id == inquiry_id)?;
    out.insert("inquiryId".into(), json!(inquiry.id));
    out.insert("inquiryTitle".into(), json!(inquiry.title));
    out.insert("customerName".into(), json!(inquiry.customer_name));
    Some(inquiry.assigned_to_id)
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn active_rules_for_trigger(&self, trigger: TriggerType) -> StoreResult<Vec<AutomationRule>> {
        let state = self.state.read().await;
        let mut rules: Vec<AutomationRule> = state
            .rules
            .iter()
            .filter(|r| r.trigger == trigger && r.is_active)
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal priorities
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }

    async fn list_rules(&self) -> StoreResult<Vec<AutomationRule>> {
        let mut rules = self.state.read().await.rules.clone();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }

    async fn get_rule(&self, id: Uuid) -> StoreResult<Option<AutomationRule>> {
        Ok(self.state.read().await.rules.iter().find(|r| r.id == id).cloned())
    }

    async fn create_rule(&self, rule: &AutomationRule) -> StoreResult<()> {
        self.state.write().await.rules.push(rule.clone());
        Ok(())
    }

    async fn update_rule(&self, rule: &AutomationRule) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let existing = state
            .rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| StoreError::NotFound(format!("rule {}", rule.id)))?;
        *existing = rule.clone();
        Ok(())
    }

    async fn delete_rule(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let before = state.rules.len();
        state.rules.retain(|r| r.id != id);
        state.logs.retain(|l| l.rule_id != id);
        Ok(state.rules.len() != before)
    }

    async fn insert_log(&self, log: &AutomationLog) -> StoreResult<()> {
        self.state.write().await.logs.push(log.clone());
        Ok(())
    }

    async fn list_logs(&self, rule_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<AutomationLog>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .rev()
            .filter(|l| rule_id.is_none_or(|id| l.rule_id == id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.iter().find(|u| u.id == id).cloned())
    }

    async fn active_users(&self) -> StoreResult<Vec<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .iter()
            .filter(|u| u.is_active)
            .cloned()
            .collect())
    }

    async fn active_users_with_role(&self, role: UserRole) -> StoreResult<Vec<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .iter()
            .filter(|u| u.is_active && u.role == role)
            .cloned()
            .collect())
    }

    async fn user_workload(&self, user_id: Uuid) -> StoreResult<i64> {
        let state = self.state.read().await;
        let open_items = state
            .items
            .iter()
            .filter(|i| i.assigned_to_id == Some(user_id))
            .filter(|i| !CLOSED_ITEM_STATUSES.contains(&i.status.as_str()))
            .count();
        let pending_costs = state
            .cost_calculations
            .iter()
            .filter(|c| c.calculated_by_id == Some(user_id) && !c.is_approved)
            .count();
        Ok((open_items + pending_costs) as i64)
    }

    async fn assign_entity(&self, entity_type: EntityType, entity_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let slot = match entity_type {
            EntityType::Inquiry => state
                .inquiries
                .iter_mut()
                .find(|i| i.id == entity_id)
                .map(|i| &mut i.assigned_to_id),
            EntityType::InquiryItem => state
                .items
                .iter_mut()
                .find(|i| i.id == entity_id)
                .map(|i| &mut i.assigned_to_id),
            EntityType::ProductionOrder => state
                .production_orders
                .iter_mut()
                .find(|o| o.id == entity_id)
                .map(|o| &mut o.assigned_to_id),
            EntityType::Quote => None,
        };
        let slot = slot.ok_or_else(|| not_found(entity_type, entity_id))?;
        *slot = Some(user_id);
        Ok(())
    }

    async fn update_entity_status(&self, entity_type: EntityType, entity_id: Uuid, status: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let slot = match entity_type {
            EntityType::Inquiry => state
                .inquiries
                .iter_mut()
                .find(|i| i.id == entity_id)
                .map(|i| &mut i.status),
            EntityType::InquiryItem => state
                .items
                .iter_mut()
                .find(|i| i.id == entity_id)
                .map(|i| &mut i.status),
            EntityType::Quote => state
                .quotes
                .iter_mut()
                .find(|q| q.id == entity_id)
                .map(|q| &mut q.status),
            EntityType::ProductionOrder => state
                .production_orders
                .iter_mut()
                .find(|o| o.id == entity_id)
                .map(|o| &mut o.status),
        };
        let slot = slot.ok_or_else(|| not_found(entity_type, entity_id))?;
        *slot = status.to_string();
        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.state.write().await.notifications.push(notification.clone());
        Ok(())
    }

    async fn entity_details(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> StoreResult<Map<String, Value>> {
        let state = self.state.read().await;
        let mut details = Map::new();

        match entity_type {
            EntityType::Inquiry => {
                let assignee = inquiry_fields(&state, entity_id, &mut details)
                    .ok_or_else(|| not_found(entity_type, entity_id))?;
                assignee_fields(&state, assignee, &mut details);
            }
            EntityType::InquiryItem => {
                let item = state
                    .items
                    .iter()
                    .find(|i| i.id == entity_id)
                    .ok_or_else(|| not_found(entity_type, entity_id))?;
                details.insert("inquiryItemId".into(), json!(item.id));
                details.insert("itemName".into(), json!(item.name));
                inquiry_fields(&state, item.inquiry_id, &mut details);
                assignee_fields(&state, item.assigned_to_id, &mut details);
            }
            EntityType::Quote => {
                let quote = state
                    .quotes
                    .iter()
                    .find(|q| q.id == entity_id)
                    .ok_or_else(|| not_found(entity_type, entity_id))?;
                details.insert("quoteId".into(), json!(quote.id));
                details.insert("quoteNumber".into(), json!(quote.quote_number));
                let assignee = inquiry_fields(&state, quote.inquiry_id, &mut details).flatten();
                assignee_fields(&state, assignee, &mut details);
            }
            EntityType::ProductionOrder => {
                let order = state
                    .production_orders
                    .iter()
                    .find(|o| o.id == entity_id)
                    .ok_or_else(|| not_found(entity_type, entity_id))?;
                details.insert("productionOrderId".into(), json!(order.id));
                details.insert("orderNumber".into(), json!(order.order_number));
                if let Some(quote) = state.quotes.iter().find(|q| q.id == order.quote_id) {
                    details.insert("quoteId".into(), json!(quote.id));
                    details.insert("quoteNumber".into(), json!(quote.quote_number));
                    inquiry_fields(&state, quote.inquiry_id, &mut details);
                }
                assignee_fields(&state, order.assigned_to_id, &mut details);
            }
        }

        Ok(details)
    }
}

#[async_trait]
impl DeadlineStore for MemoryStore {
    async fn upsert_deadline(&self, deadline: &Deadline) -> StoreResult<Deadline> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .deadlines
            .iter_mut()
            .find(|d| d.entity_type == deadline.entity_type && d.entity_id == deadline.entity_id)
        {
            existing.due_date = deadline.due_date;
            existing.warning_date = deadline.warning_date;
            existing.escalation_date = deadline.escalation_date;
            existing.reminders_sent = 0;
            existing.status = DeadlineStatus::Active;
            existing.completed_at = None;
            existing.updated_at = Some(deadline.created_at);
            return Ok(existing.clone());
        }

        state.deadlines.push(deadline.clone());
        Ok(deadline.clone())
    }

    async fn active_deadlines(&self) -> StoreResult<Vec<Deadline>> {
        let mut active: Vec<Deadline> = self
            .state
            .read()
            .await
            .deadlines
            .iter()
            .filter(|d| d.status == DeadlineStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|d| d.due_date);
        Ok(active)
    }

    async fn mark_overdue(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(deadline) = state
            .deadlines
            .iter_mut()
            .find(|d| d.id == id && d.status == DeadlineStatus::Active)
        {
            deadline.status = DeadlineStatus::Overdue;
        }
        Ok(())
    }

    async fn record_reminder(&self, id: Uuid, reminders_sent: i32) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(deadline) = state.deadlines.iter_mut().find(|d| d.id == id) {
            deadline.reminders_sent = deadline.reminders_sent.max(reminders_sent);
        }
        Ok(())
    }

    async fn complete_deadline(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for deadline in state.deadlines.iter_mut().filter(|d| {
            d.entity_type == entity_type.as_str()
                && d.entity_id == entity_id
                && matches!(d.status, DeadlineStatus::Active | DeadlineStatus::Overdue)
        }) {
            deadline.status = DeadlineStatus::Completed;
            deadline.completed_at = Some(completed_at);
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn active_template(&self, name: &str) -> StoreResult<Option<EmailTemplate>> {
        Ok(self
            .state
            .read()
            .await
            .templates
            .iter()
            .find(|t| t.name == name && t.is_active)
            .cloned())
    }

    async fn list_templates(&self) -> StoreResult<Vec<EmailTemplate>> {
        Ok(self.state.read().await.templates.clone())
    }

    async fn upsert_template(&self, template: &EmailTemplate) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state.templates.iter_mut().find(|t| t.name == template.name) {
            Some(existing) => {
                existing.subject = template.subject.clone();
                existing.html_content = template.html_content.clone();
                existing.text_content = template.text_content.clone();
                existing.variables = template.variables.clone();
            }
            None => state.templates.push(template.clone()),
        }
        Ok(())
    }
}

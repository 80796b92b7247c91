// Domain Event Hooks - Context assembly for CRUD write paths
//
// Each hook flattens the record that just changed into a rule context and
// hands it to the engine. Results are returned for callers that want them,
// but the engine never errors, so a hook can't fail the write that called it.

use quoteflow_shared::{CostCalculation, Inquiry, InquiryItem, ProductionOrder, Quote, User};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::engine::{AutomationEngine, RuleResult};
use super::error::AutomationResult;
use super::triggers::{RuleExecution, TriggerType};
use crate::store::DomainStore;

pub struct AutomationHooks {
    engine: Arc<AutomationEngine>,
    domain: Arc<dyn DomainStore>,
}

fn amount(value: Decimal) -> Value {
    json!(value.to_f64())
}

fn inquiry_fields(inquiry: &Inquiry) -> serde_json::Map<String, Value> {
    let context = json!({
        "inquiryId": inquiry.id,
        "inquiryTitle": inquiry.title,
        "title": inquiry.title,
        "description": inquiry.description,
        "customerId": inquiry.customer_id,
        "customerName": inquiry.customer_name,
        "contactEmail": inquiry.contact_email,
        "status": inquiry.status,
        "priority": inquiry.priority,
        "assignedToId": inquiry.assigned_to_id,
        "createdById": inquiry.created_by_id,
        "deadline": inquiry.deadline.map(|d| d.to_rfc3339()),
        "createdAt": inquiry.created_at.to_rfc3339(),
    });

    match context {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn cost_fields(calculation: &CostCalculation, item: &InquiryItem, inquiry: &Inquiry) -> serde_json::Map<String, Value> {
    let mut context = inquiry_fields(inquiry);
    context.insert("costCalculationId".into(), json!(calculation.id));
    context.insert("inquiryItemId".into(), json!(item.id));
    context.insert("itemName".into(), json!(item.name));
    context.insert("quantity".into(), json!(item.quantity));
    context.insert("itemStatus".into(), json!(item.status));
    context.insert("materialCost".into(), amount(calculation.material_cost));
    context.insert("laborCost".into(), amount(calculation.labor_cost));
    context.insert("overheadCost".into(), amount(calculation.overhead_cost));
    context.insert("totalCost".into(), amount(calculation.total_cost));
    context.insert("isApproved".into(), json!(calculation.is_approved));
    context.insert("calculatedById".into(), json!(calculation.calculated_by_id));
    context.insert("assignedToId".into(), json!(item.assigned_to_id));
    context
}

impl AutomationHooks {
    pub fn new(engine: Arc<AutomationEngine>, domain: Arc<dyn DomainStore>) -> Self {
        Self { engine, domain }
    }

    async fn fire(
        &self,
        trigger: TriggerType,
        context: serde_json::Map<String, Value>,
        user_id: Option<Uuid>,
    ) -> Vec<RuleResult> {
        debug!(trigger = %trigger, "Firing automation hook");
        self.engine
            .execute_rules_for_trigger(RuleExecution::new(trigger, Value::Object(context)).with_user(user_id))
            .await
    }

    pub async fn on_inquiry_created(&self, inquiry: &Inquiry, user_id: Option<Uuid>) -> Vec<RuleResult> {
        self.fire(TriggerType::InquiryCreated, inquiry_fields(inquiry), user_id)
            .await
    }

    pub async fn on_inquiry_status_changed(
        &self,
        inquiry: &Inquiry,
        old_status: &str,
        user_id: Option<Uuid>,
    ) -> Vec<RuleResult> {
        let mut context = inquiry_fields(inquiry);
        context.insert("oldStatus".into(), json!(old_status));
        context.insert("newStatus".into(), json!(inquiry.status));
        self.fire(TriggerType::InquiryStatusChanged, context, user_id)
            .await
    }

    pub async fn on_item_assigned(
        &self,
        item: &InquiryItem,
        inquiry: &Inquiry,
        assignee: &User,
        user_id: Option<Uuid>,
    ) -> Vec<RuleResult> {
        let mut context = inquiry_fields(inquiry);
        context.insert("inquiryItemId".into(), json!(item.id));
        context.insert("itemName".into(), json!(item.name));
        context.insert("quantity".into(), json!(item.quantity));
        context.insert("status".into(), json!(item.status));
        context.insert("assignedToId".into(), json!(assignee.id));
        context.insert("assigneeName".into(), json!(assignee.name));
        context.insert("assigneeEmail".into(), json!(assignee.email));
        context.insert("assigneeRole".into(), json!(assignee.role));
        self.fire(TriggerType::ItemAssigned, context, user_id).await
    }

    pub async fn on_cost_calculated(
        &self,
        calculation: &CostCalculation,
        item: &InquiryItem,
        inquiry: &Inquiry,
        user_id: Option<Uuid>,
    ) -> Vec<RuleResult> {
        self.fire(
            TriggerType::CostCalculated,
            cost_fields(calculation, item, inquiry),
            user_id,
        )
        .await
    }

    pub async fn on_approval_required(
        &self,
        calculation: &CostCalculation,
        item: &InquiryItem,
        inquiry: &Inquiry,
        approval_type: &str,
        user_id: Option<Uuid>,
    ) -> Vec<RuleResult> {
        let mut context = cost_fields(calculation, item, inquiry);
        context.insert("approvalType".into(), json!(approval_type));
        self.fire(TriggerType::ApprovalRequired, context, user_id)
            .await
    }

    pub async fn on_quote_created(&self, quote: &Quote, inquiry: &Inquiry, user_id: Option<Uuid>) -> Vec<RuleResult> {
        let mut context = inquiry_fields(inquiry);
        context.insert("quoteId".into(), json!(quote.id));
        context.insert("quoteNumber".into(), json!(quote.quote_number));
        context.insert("total".into(), amount(quote.total));
        context.insert("currency".into(), json!(quote.currency));
        context.insert("status".into(), json!(quote.status));
        context.insert("validUntil".into(), json!(quote.valid_until.map(|d| d.to_rfc3339())));
        self.fire(TriggerType::QuoteCreated, context, user_id).await
    }

    pub async fn on_production_order_created(
        &self,
        order: &ProductionOrder,
        quote: &Quote,
        inquiry: &Inquiry,
        user_id: Option<Uuid>,
    ) -> Vec<RuleResult> {
        let mut context = inquiry_fields(inquiry);
        context.insert("productionOrderId".into(), json!(order.id));
        context.insert("orderNumber".into(), json!(order.order_number));
        context.insert("status".into(), json!(order.status));
        context.insert("dueDate".into(), json!(order.due_date.map(|d| d.to_rfc3339())));
        context.insert("quoteId".into(), json!(quote.id));
        context.insert("quoteNumber".into(), json!(quote.quote_number));
        context.insert("total".into(), amount(quote.total));
        context.insert("assignedToId".into(), json!(order.assigned_to_id));
        self.fire(TriggerType::ProductionOrderCreated, context, user_id)
            .await
    }

    /// Fire WORKLOAD_THRESHOLD for every active user whose workload is at
    /// or above `threshold`. Returns how many users crossed it.
    pub async fn check_workload_balance(&self, threshold: i64) -> AutomationResult<usize> {
        let users = self.domain.active_users().await?;
        let mut overloaded = 0;

        for user in users {
            let workload = self.domain.user_workload(user.id).await?;
            if workload < threshold {
                continue;
            }
            overloaded += 1;

            let context = json!({
                "userId": user.id,
                "assignedToId": user.id,
                "userName": user.name,
                "userEmail": user.email,
                "role": user.role,
                "workload": workload,
                "threshold": threshold,
            });
            if let Value::Object(context) = context {
                self.fire(TriggerType::WorkloadThreshold, context, None).await;
            }
        }

        info!(overloaded, threshold, "Workload check completed");
        Ok(overloaded)
    }
}

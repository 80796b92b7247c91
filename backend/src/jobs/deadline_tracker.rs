// Deadline Tracker - Due/warning/escalation lifecycle for domain entities

use chrono::{DateTime, Duration, Utc};
use quoteflow_shared::{Deadline, DeadlineStatus};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::automation::{
    AutomationEngine, AutomationError, AutomationResult, EntityType, RuleExecution, TriggerType,
};
use crate::clock::Clock;
use crate::store::{DeadlineStore, DomainStore, StoreError};

pub const DEFAULT_WARNING_DAYS: i64 = 3;
pub const DEFAULT_ESCALATION_DAYS: i64 = 1;

/// Reminder counter values
const WARNING_SENT: i32 = 1;
const ESCALATION_SENT: i32 = 2;

pub struct DeadlineTracker {
    deadlines: Arc<dyn DeadlineStore>,
    domain: Arc<dyn DomainStore>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineCheckResult {
    pub deadlines_checked: usize,
    pub warnings: usize,
    pub escalations: usize,
    pub overdue: usize,
    pub errors: Vec<String>,
}

/// What a check should do with one active deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStage {
    Overdue,
    Escalation,
    Warning,
}

/// Overdue beats escalation beats warning. Each reminder fires at most once.
pub fn classify(deadline: &Deadline, now: DateTime<Utc>) -> Option<DeadlineStage> {
    if now > deadline.due_date {
        Some(DeadlineStage::Overdue)
    } else if now > deadline.escalation_date && deadline.reminders_sent < ESCALATION_SENT {
        Some(DeadlineStage::Escalation)
    } else if now > deadline.warning_date && deadline.reminders_sent == 0 {
        Some(DeadlineStage::Warning)
    } else {
        None
    }
}

/// Whole days between two instants, rounded up
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    ((to - from).num_milliseconds() as f64 / 86_400_000.0).ceil() as i64
}

impl DeadlineTracker {
    pub fn new(
        deadlines: Arc<dyn DeadlineStore>,
        domain: Arc<dyn DomainStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            deadlines,
            domain,
            clock,
        }
    }

    /// Create the deadline for an entity, or re-arm the existing one.
    pub async fn create_deadline(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        due_date: DateTime<Utc>,
        warning_days: i64,
        escalation_days: i64,
    ) -> AutomationResult<Deadline> {
        let now = self.clock.now();
        let deadline = Deadline {
            id: Uuid::new_v4(),
            entity_type: entity_type.as_str().to_string(),
            entity_id,
            due_date,
            warning_date: due_date - Duration::days(warning_days),
            escalation_date: due_date - Duration::days(escalation_days),
            reminders_sent: 0,
            status: DeadlineStatus::Active,
            completed_at: None,
            created_at: now,
            updated_at: None,
        };

        let stored = self.deadlines.upsert_deadline(&deadline).await?;
        info!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            due_date = %stored.due_date,
            "Deadline scheduled"
        );
        Ok(stored)
    }

    /// Mark the entity's ACTIVE or OVERDUE deadline completed. Completing an
    /// already completed or missing deadline is a no-op.
    pub async fn complete_deadline(&self, entity_type: EntityType, entity_id: Uuid) -> AutomationResult<u64> {
        let completed = self
            .deadlines
            .complete_deadline(entity_type, entity_id, self.clock.now())
            .await?;

        if completed > 0 {
            info!(entity_type = %entity_type, entity_id = %entity_id, "Deadline completed");
        }
        Ok(completed)
    }

    /// Classify every active deadline and fire DEADLINE_APPROACHING for the
    /// ones that need attention. One failing deadline does not stop the rest.
    pub async fn check_deadlines(&self, engine: &AutomationEngine) -> AutomationResult<DeadlineCheckResult> {
        let mut result = DeadlineCheckResult::default();
        let now = self.clock.now();

        let deadlines = self.deadlines.active_deadlines().await?;
        result.deadlines_checked = deadlines.len();

        for deadline in deadlines {
            let Some(stage) = classify(&deadline, now) else {
                continue;
            };

            match self.process_deadline(engine, &deadline, stage, now).await {
                Ok(()) => match stage {
                    DeadlineStage::Overdue => result.overdue += 1,
                    DeadlineStage::Escalation => result.escalations += 1,
                    DeadlineStage::Warning => result.warnings += 1,
                },
                Err(e) => {
                    error!(deadline_id = %deadline.id, error = %e, "Failed to process deadline");
                    result
                        .errors
                        .push(format!("Deadline {}: {}", deadline.id, e));
                }
            }
        }

        info!(
            checked = result.deadlines_checked,
            warnings = result.warnings,
            escalations = result.escalations,
            overdue = result.overdue,
            errors = result.errors.len(),
            "Deadline check completed"
        );

        Ok(result)
    }

    async fn process_deadline(
        &self,
        engine: &AutomationEngine,
        deadline: &Deadline,
        stage: DeadlineStage,
        now: DateTime<Utc>,
    ) -> AutomationResult<()> {
        let entity_type: EntityType = deadline
            .entity_type
            .parse()
            .map_err(|e: String| AutomationError::Store(StoreError::Corrupt(e)))?;
        let details = self.domain.entity_details(entity_type, deadline.entity_id).await?;

        match stage {
            DeadlineStage::Overdue => self.deadlines.mark_overdue(deadline.id).await?,
            DeadlineStage::Escalation => {
                self.deadlines
                    .record_reminder(deadline.id, ESCALATION_SENT)
                    .await?
            }
            DeadlineStage::Warning => {
                self.deadlines
                    .record_reminder(deadline.id, WARNING_SENT)
                    .await?
            }
        }

        debug!(deadline_id = %deadline.id, ?stage, "Firing deadline trigger");
        let context = deadline_context(deadline, stage, now, details);
        engine
            .execute_rules_for_trigger(RuleExecution::new(TriggerType::DeadlineApproaching, context))
            .await;

        Ok(())
    }
}

fn deadline_context(
    deadline: &Deadline,
    stage: DeadlineStage,
    now: DateTime<Utc>,
    details: Map<String, Value>,
) -> Value {
    let mut context = details;
    context.insert("deadlineId".to_string(), json!(deadline.id));
    context.insert("entityType".to_string(), json!(deadline.entity_type));
    context.insert("entityId".to_string(), json!(deadline.entity_id));
    context.insert("dueDate".to_string(), json!(deadline.due_date.to_rfc3339()));
    context.insert("isOverdue".to_string(), json!(stage == DeadlineStage::Overdue));
    context.insert("isEscalation".to_string(), json!(stage == DeadlineStage::Escalation));
    context.insert("isWarning".to_string(), json!(stage == DeadlineStage::Warning));

    match stage {
        DeadlineStage::Overdue => {
            context.insert("daysOverdue".to_string(), json!(days_between(deadline.due_date, now)));
        }
        DeadlineStage::Escalation | DeadlineStage::Warning => {
            context.insert("daysUntilDue".to_string(), json!(days_between(now, deadline.due_date)));
        }
    }

    Value::Object(context)
}

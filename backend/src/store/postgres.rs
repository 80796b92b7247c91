// Postgres-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quoteflow_shared::{
    AutomationLog, Deadline, DeadlineStatus, EmailTemplate, LogStatus, Notification, User, UserRole,
};
use serde_json::{json, Map, Value};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use super::{
    DeadlineStore, DomainStore, RuleStore, StoreError, StoreResult, TemplateStore,
    CLOSED_ITEM_STATUSES,
};
use crate::automation::{AutomationRule, EntityType, TriggerType};

#[derive(Debug, Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

const RULE_COLUMNS: &str = r#"
    id, name, description, trigger, conditions, actions, priority,
    is_active, created_by, created_at, updated_at
"#;

const LOG_COLUMNS: &str = r#"
    id, rule_id, trigger, status, message, error, execution_time_ms,
    context, actions_executed, user_id, created_at
"#;

const DEADLINE_COLUMNS: &str = r#"
    id, entity_type, entity_id, due_date, warning_date, escalation_date,
    reminders_sent, status, completed_at, created_at, updated_at
"#;

fn corrupt(what: &str, err: String) -> StoreError {
    StoreError::Corrupt(format!("{what}: {err}"))
}

fn rule_from_row(row: &PgRow) -> StoreResult<AutomationRule> {
    let trigger: String = row.try_get("trigger")?;
    Ok(AutomationRule {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        trigger: trigger.parse().map_err(|e| corrupt("rule trigger", e))?,
        conditions: serde_json::from_value(row.try_get("conditions")?)?,
        actions: serde_json::from_value(row.try_get("actions")?)?,
        priority: row.try_get("priority")?,
        is_active: row.try_get("is_active")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Rules that fail to parse are skipped so one bad row cannot block a trigger.
fn parse_rules(rows: Vec<PgRow>) -> Vec<AutomationRule> {
    rows.iter()
        .filter_map(|row| match rule_from_row(row) {
            Ok(rule) => Some(rule),
            Err(e) => {
                let id: Option<Uuid> = row.try_get("id").ok();
                warn!(rule_id = ?id, error = %e, "Skipping unreadable automation rule");
                None
            }
        })
        .collect()
}

fn log_from_row(row: &PgRow) -> StoreResult<AutomationLog> {
    let status: String = row.try_get("status")?;
    Ok(AutomationLog {
        id: row.try_get("id")?,
        rule_id: row.try_get("rule_id")?,
        trigger: row.try_get("trigger")?,
        status: status.parse::<LogStatus>().map_err(|e| corrupt("log status", e))?,
        message: row.try_get("message")?,
        error: row.try_get("error")?,
        execution_time_ms: row.try_get("execution_time_ms")?,
        context: row.try_get("context")?,
        actions_executed: row.try_get("actions_executed")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: role.parse::<UserRole>().map_err(|e| corrupt("user role", e))?,
        is_active: row.try_get("is_active")?,
    })
}

fn deadline_from_row(row: &PgRow) -> StoreResult<Deadline> {
    let status: String = row.try_get("status")?;
    Ok(Deadline {
        id: row.try_get("id")?,
        entity_type: row.try_get("entity_type")?,
        entity_id: row.try_get("entity_id")?,
        due_date: row.try_get("due_date")?,
        warning_date: row.try_get("warning_date")?,
        escalation_date: row.try_get("escalation_date")?,
        reminders_sent: row.try_get("reminders_sent")?,
        status: status.parse::<DeadlineStatus>().map_err(|e| corrupt("deadline status", e))?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entity_table(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Inquiry => "inquiries",
        EntityType::InquiryItem => "inquiry_items",
        EntityType::Quote => "quotes",
        EntityType::ProductionOrder => "production_orders",
    }
}

#[async_trait]
impl RuleStore for PgStore {
    async fn active_rules_for_trigger(&self, trigger: TriggerType) -> StoreResult<Vec<AutomationRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules
             WHERE trigger = $1 AND is_active = true
             ORDER BY priority DESC, seq ASC"
        ))
        .bind(trigger.as_str())
        .fetch_all(&self.db_pool)
        .await?;

        Ok(parse_rules(rows))
    }

    async fn list_rules(&self) -> StoreResult<Vec<AutomationRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules ORDER BY priority DESC, seq ASC"
        ))
        .fetch_all(&self.db_pool)
        .await?;

        Ok(parse_rules(rows))
    }

    async fn get_rule(&self, id: Uuid) -> StoreResult<Option<AutomationRule>> {
        let row = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM automation_rules WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        row.as_ref().map(rule_from_row).transpose()
    }

    async fn create_rule(&self, rule: &AutomationRule) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_rules
            (id, name, description, trigger, conditions, actions, priority, is_active, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.trigger.as_str())
        .bind(serde_json::to_value(&rule.conditions)?)
        .bind(serde_json::to_value(&rule.actions)?)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.created_by)
        .bind(rule.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn update_rule(&self, rule: &AutomationRule) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE automation_rules
            SET name = $2, description = $3, trigger = $4, conditions = $5, actions = $6,
                priority = $7, is_active = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.trigger.as_str())
        .bind(serde_json::to_value(&rule.conditions)?)
        .bind(serde_json::to_value(&rule.actions)?)
        .bind(rule.priority)
        .bind(rule.is_active)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("rule {}", rule.id)));
        }
        Ok(())
    }

    async fn delete_rule(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM automation_rules WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_log(&self, log: &AutomationLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_logs
            (id, rule_id, trigger, status, message, error, execution_time_ms, context, actions_executed, user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(log.id)
        .bind(log.rule_id)
        .bind(&log.trigger)
        .bind(log.status.as_str())
        .bind(&log.message)
        .bind(&log.error)
        .bind(log.execution_time_ms)
        .bind(&log.context)
        .bind(&log.actions_executed)
        .bind(log.user_id)
        .bind(log.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn list_logs(&self, rule_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<AutomationLog>> {
        let rows = match rule_id {
            Some(rule_id) => {
                sqlx::query(&format!(
                    "SELECT {LOG_COLUMNS} FROM automation_logs WHERE rule_id = $1
                     ORDER BY created_at DESC LIMIT $2"
                ))
                .bind(rule_id)
                .bind(limit)
                .fetch_all(&self.db_pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {LOG_COLUMNS} FROM automation_logs ORDER BY created_at DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.db_pool)
                .await?
            }
        };

        rows.iter().map(log_from_row).collect()
    }
}

#[async_trait]
impl DomainStore for PgStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, role, is_active FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn active_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, email, name, role, is_active FROM users WHERE is_active = true ORDER BY created_at",
        )
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn active_users_with_role(&self, role: UserRole) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, email, name, role, is_active FROM users
             WHERE is_active = true AND role = $1 ORDER BY created_at",
        )
        .bind(role.as_str())
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn user_workload(&self, user_id: Uuid) -> StoreResult<i64> {
        let closed: Vec<String> = CLOSED_ITEM_STATUSES.iter().map(|s| s.to_string()).collect();

        let workload: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COUNT(*) FROM inquiry_items
                 WHERE assigned_to_id = $1 AND NOT (status = ANY($2)))
              + (SELECT COUNT(*) FROM cost_calculations
                 WHERE calculated_by_id = $1 AND is_approved = false)
            "#,
        )
        .bind(user_id)
        .bind(&closed)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(workload)
    }

    async fn assign_entity(&self, entity_type: EntityType, entity_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let table = entity_table(entity_type);
        let result = sqlx::query(&format!(
            "UPDATE {table} SET assigned_to_id = $2, updated_at = NOW() WHERE id = $1"
        ))
        .bind(entity_id)
        .bind(user_id)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{entity_type} {entity_id}")));
        }
        Ok(())
    }

    async fn update_entity_status(&self, entity_type: EntityType, entity_id: Uuid, status: &str) -> StoreResult<()> {
        let table = entity_table(entity_type);
        let result = sqlx::query(&format!(
            "UPDATE {table} SET status = $2, updated_at = NOW() WHERE id = $1"
        ))
        .bind(entity_id)
        .bind(status)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{entity_type} {entity_id}")));
        }
        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, notification_type, data, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.notification_type)
        .bind(&notification.data)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn entity_details(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> StoreResult<Map<String, Value>> {
        let sql = match entity_type {
            EntityType::Inquiry => {
                r#"
                SELECT i.id AS inquiry_id, i.title AS inquiry_title, i.customer_name,
                       NULL::uuid AS inquiry_item_id, NULL::text AS item_name,
                       NULL::uuid AS quote_id, NULL::text AS quote_number,
                       NULL::uuid AS production_order_id, NULL::text AS order_number,
                       u.id AS assigned_to_id, u.name AS assigned_to_name, u.email AS assigned_to_email
                FROM inquiries i
                LEFT JOIN users u ON u.id = i.assigned_to_id
                WHERE i.id = $1
                "#
            }
            EntityType::InquiryItem => {
                r#"
                SELECT i.id AS inquiry_id, i.title AS inquiry_title, i.customer_name,
                       it.id AS inquiry_item_id, it.name AS item_name,
                       NULL::uuid AS quote_id, NULL::text AS quote_number,
                       NULL::uuid AS production_order_id, NULL::text AS order_number,
                       u.id AS assigned_to_id, u.name AS assigned_to_name, u.email AS assigned_to_email
                FROM inquiry_items it
                JOIN inquiries i ON i.id = it.inquiry_id
                LEFT JOIN users u ON u.id = it.assigned_to_id
                WHERE it.id = $1
                "#
            }
            EntityType::Quote => {
                r#"
                SELECT i.id AS inquiry_id, i.title AS inquiry_title, i.customer_name,
                       NULL::uuid AS inquiry_item_id, NULL::text AS item_name,
                       q.id AS quote_id, q.quote_number,
                       NULL::uuid AS production_order_id, NULL::text AS order_number,
                       u.id AS assigned_to_id, u.name AS assigned_to_name, u.email AS assigned_to_email
                FROM quotes q
                JOIN inquiries i ON i.id = q.inquiry_id
                LEFT JOIN users u ON u.id = i.assigned_to_id
                WHERE q.id = $1
                "#
            }
            EntityType::ProductionOrder => {
                r#"
                SELECT i.id AS inquiry_id, i.title AS inquiry_title, i.customer_name,
                       NULL::uuid AS inquiry_item_id, NULL::text AS item_name,
                       q.id AS quote_id, q.quote_number,
                       po.id AS production_order_id, po.order_number,
                       u.id AS assigned_to_id, u.name AS assigned_to_name, u.email AS assigned_to_email
                FROM production_orders po
                LEFT JOIN quotes q ON q.id = po.quote_id
                LEFT JOIN inquiries i ON i.id = q.inquiry_id
                LEFT JOIN users u ON u.id = po.assigned_to_id
                WHERE po.id = $1
                "#
            }
        };

        let row = sqlx::query(sql)
            .bind(entity_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{entity_type} {entity_id}")))?;

        let mut details = Map::new();
        let uuid_fields = [
            ("inquiryId", "inquiry_id"),
            ("inquiryItemId", "inquiry_item_id"),
            ("quoteId", "quote_id"),
            ("productionOrderId", "production_order_id"),
            ("assignedToId", "assigned_to_id"),
        ];
        for (key, column) in uuid_fields {
            let value: Option<Uuid> = row.try_get(column)?;
            if value.is_some() || key == "assignedToId" {
                details.insert(key.to_string(), json!(value));
            }
        }

        let text_fields = [
            ("inquiryTitle", "inquiry_title"),
            ("customerName", "customer_name"),
            ("itemName", "item_name"),
            ("quoteNumber", "quote_number"),
            ("orderNumber", "order_number"),
            ("assignedToName", "assigned_to_name"),
            ("assignedToEmail", "assigned_to_email"),
        ];
        for (key, column) in text_fields {
            let value: Option<String> = row.try_get(column)?;
            if value.is_some() || key.starts_with("assignedTo") {
                details.insert(key.to_string(), json!(value));
            }
        }

        Ok(details)
    }
}

#[async_trait]
impl DeadlineStore for PgStore {
    async fn upsert_deadline(&self, deadline: &Deadline) -> StoreResult<Deadline> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO deadlines
            (id, entity_type, entity_id, due_date, warning_date, escalation_date, reminders_sent, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, 'ACTIVE', $7)
            ON CONFLICT (entity_type, entity_id) DO UPDATE
            SET due_date = EXCLUDED.due_date,
                warning_date = EXCLUDED.warning_date,
                escalation_date = EXCLUDED.escalation_date,
                reminders_sent = 0,
                status = 'ACTIVE',
                completed_at = NULL,
                updated_at = EXCLUDED.created_at
            RETURNING {DEADLINE_COLUMNS}
            "#
        ))
        .bind(deadline.id)
        .bind(&deadline.entity_type)
        .bind(deadline.entity_id)
        .bind(deadline.due_date)
        .bind(deadline.warning_date)
        .bind(deadline.escalation_date)
        .bind(deadline.created_at)
        .fetch_one(&self.db_pool)
        .await?;

        deadline_from_row(&row)
    }

    async fn active_deadlines(&self) -> StoreResult<Vec<Deadline>> {
        let rows = sqlx::query(&format!(
            "SELECT {DEADLINE_COLUMNS} FROM deadlines WHERE status = 'ACTIVE' ORDER BY due_date ASC"
        ))
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(deadline_from_row).collect()
    }

    async fn mark_overdue(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE deadlines SET status = 'OVERDUE', updated_at = NOW()
             WHERE id = $1 AND status = 'ACTIVE'",
        )
        .bind(id)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn record_reminder(&self, id: Uuid, reminders_sent: i32) -> StoreResult<()> {
        sqlx::query(
            "UPDATE deadlines SET reminders_sent = $2, updated_at = NOW()
             WHERE id = $1 AND reminders_sent < $2",
        )
        .bind(id)
        .bind(reminders_sent)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn complete_deadline(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE deadlines
            SET status = 'COMPLETED', completed_at = $3, updated_at = $3
            WHERE entity_type = $1 AND entity_id = $2 AND status IN ('ACTIVE', 'OVERDUE')
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(completed_at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TemplateStore for PgStore {
    async fn active_template(&self, name: &str) -> StoreResult<Option<EmailTemplate>> {
        let template = sqlx::query_as::<_, EmailTemplate>(
            r#"
            SELECT id, name, subject, html_content, text_content, variables, is_active
            FROM email_templates
            WHERE name = $1 AND is_active = true
            "#,
        )
        .bind(name)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(template)
    }

    async fn list_templates(&self) -> StoreResult<Vec<EmailTemplate>> {
        let templates = sqlx::query_as::<_, EmailTemplate>(
            r#"
            SELECT id, name, subject, html_content, text_content, variables, is_active
            FROM email_templates
            ORDER BY name
            "#,
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(templates)
    }

    async fn upsert_template(&self, template: &EmailTemplate) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO email_templates (id, name, subject, html_content, text_content, variables, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (name) DO UPDATE
            SET subject = EXCLUDED.subject,
                html_content = EXCLUDED.html_content,
                text_content = EXCLUDED.text_content,
                variables = EXCLUDED.variables,
                updated_at = NOW()
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.html_content)
        .bind(&template.text_content)
        .bind(&template.variables)
        .bind(template.is_active)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

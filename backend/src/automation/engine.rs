// Automation Engine - Trigger dispatch, rule evaluation and audit logging

use chrono::{DateTime, Utc};
use quoteflow_shared::{AutomationLog, LogStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::actions::Action;
use super::conditions::{evaluate_conditions, Condition};
use super::error::AutomationResult;
use super::executor::ActionExecutor;
use super::triggers::{RuleContext, RuleExecution, TriggerType};
use crate::clock::Clock;
use crate::store::RuleStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: TriggerType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Higher runs first
    pub priority: i32,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AutomationRule {
    pub fn new(name: &str, trigger: TriggerType, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            trigger,
            conditions: Vec::new(),
            actions: Vec::new(),
            priority: 0,
            is_active: true,
            created_by: None,
            created_at,
            updated_at: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Outcome of one rule for one trigger execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub success: bool,
    /// Every action that was started, including the one that failed
    pub executed_actions: Vec<Action>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: i64,
}

pub struct AutomationEngine {
    rules: Arc<dyn RuleStore>,
    executor: ActionExecutor,
    clock: Arc<dyn Clock>,
}

impl AutomationEngine {
    pub fn new(rules: Arc<dyn RuleStore>, executor: ActionExecutor, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules,
            executor,
            clock,
        }
    }

    /// Run every active rule registered for the trigger.
    ///
    /// Rules run sequentially in priority order against the context captured
    /// when the trigger fired; a failing rule never stops the ones after it.
    /// If the rules cannot be loaded the trigger is skipped and an empty list
    /// is returned.
    pub async fn execute_rules_for_trigger(&self, execution: RuleExecution) -> Vec<RuleResult> {
        let rules = match self.rules.active_rules_for_trigger(execution.trigger).await {
            Ok(rules) => rules,
            Err(e) => {
                error!(trigger = %execution.trigger, error = %e, "Failed to load automation rules");
                return Vec::new();
            }
        };

        if rules.is_empty() {
            debug!(trigger = %execution.trigger, "No active automation rules");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(rules.len());
        for rule in &rules {
            let result = self.execute_rule(rule, &execution).await;
            self.log_execution(rule, &execution, &result).await;
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        info!(
            trigger = %execution.trigger,
            rules = results.len(),
            succeeded = results.len() - failed,
            failed,
            "Automation trigger processed"
        );

        results
    }

    async fn execute_rule(&self, rule: &AutomationRule, execution: &RuleExecution) -> RuleResult {
        let start = Instant::now();
        let mut executed_actions = Vec::new();

        let outcome = self
            .run_rule(rule, &execution.context, &mut executed_actions)
            .await;
        let execution_time_ms = start.elapsed().as_millis() as i64;

        let (success, message, error) = match outcome {
            Ok(true) => (
                true,
                format!("Executed {} action(s)", executed_actions.len()),
                None,
            ),
            Ok(false) => (true, "Conditions not met".to_string(), None),
            Err(e) => {
                error!(rule_id = %rule.id, rule = %rule.name, error = %e, "Automation rule failed");
                (false, "Rule execution failed".to_string(), Some(e.to_string()))
            }
        };

        RuleResult {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            success,
            executed_actions,
            message,
            error,
            execution_time_ms,
        }
    }

    /// Returns whether the conditions held. The first failing action aborts
    /// the rest of the rule.
    async fn run_rule(
        &self,
        rule: &AutomationRule,
        context: &RuleContext,
        executed: &mut Vec<Action>,
    ) -> AutomationResult<bool> {
        if !evaluate_conditions(&rule.conditions, context)? {
            debug!(rule_id = %rule.id, "Rule conditions not met");
            return Ok(false);
        }

        for action in &rule.actions {
            executed.push(action.clone());
            debug!(rule_id = %rule.id, action = action.kind(), "Executing action");
            self.executor.execute(action, context).await?;
        }

        Ok(true)
    }

    async fn log_execution(&self, rule: &AutomationRule, execution: &RuleExecution, result: &RuleResult) {
        let actions_executed = serde_json::to_value(&result.executed_actions)
            .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));

        let log = AutomationLog {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            trigger: execution.trigger.as_str().to_string(),
            status: if result.success {
                LogStatus::Success
            } else {
                LogStatus::Failed
            },
            message: Some(result.message.clone()),
            error: result.error.clone(),
            execution_time_ms: result.execution_time_ms,
            context: execution.context.clone(),
            actions_executed,
            user_id: execution.user_id,
            created_at: self.clock.now(),
        };

        if let Err(e) = self.rules.insert_log(&log).await {
            warn!(rule_id = %rule.id, error = %e, "Failed to write automation log");
        }
    }
}

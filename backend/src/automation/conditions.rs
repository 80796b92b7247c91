// Automation Conditions - Ordered predicates evaluated against a trigger context

use serde::{Deserialize, Serialize};

use super::coerce::{lookup_path, strict_equals, to_display_string, to_number};
use super::error::AutomationError;

/// Connector between a condition and the one that follows it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOperator {
    #[default]
    And,
    Or,
}

/// Condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    In,
    NotIn,
    /// Stored operator this version does not understand; never matches.
    #[serde(other)]
    Unknown,
}

/// A single condition to evaluate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Field name to evaluate (supports dot notation for nested fields)
    pub field: String,
    pub operator: ConditionOperator,
    /// Absent means undefined, which is distinct from an explicit `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub logic: LogicOperator,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: Some(value),
            logic: LogicOperator::And,
        }
    }

    pub fn equals(field: &str, value: serde_json::Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn not_equals(field: &str, value: serde_json::Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, value)
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, serde_json::Value::String(value.to_string()))
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, serde_json::json!(value))
    }

    pub fn in_list(field: &str, values: Vec<serde_json::Value>) -> Self {
        Self::new(field, ConditionOperator::In, serde_json::Value::Array(values))
    }

    pub fn not_in_list(field: &str, values: Vec<serde_json::Value>) -> Self {
        Self::new(field, ConditionOperator::NotIn, serde_json::Value::Array(values))
    }

    /// Set the connector used to combine the *next* condition.
    pub fn then(mut self, logic: LogicOperator) -> Self {
        self.logic = logic;
        self
    }

    pub fn evaluate(&self, context: &serde_json::Value) -> Result<bool, AutomationError> {
        let field_value = lookup_path(context, &self.field);
        let expected = self.value.as_ref();

        let outcome = match self.operator {
            ConditionOperator::Equals => strict_equals(field_value, expected),
            ConditionOperator::NotEquals => !strict_equals(field_value, expected),
            ConditionOperator::Contains => {
                to_display_string(field_value).contains(&to_display_string(expected))
            }
            // NaN on either side makes both comparisons false
            ConditionOperator::GreaterThan => {
                to_number(field_value) > to_number(expected)
            }
            ConditionOperator::LessThan => to_number(field_value) < to_number(expected),
            ConditionOperator::In => self
                .list_value()?
                .iter()
                .any(|candidate| strict_equals(field_value, Some(candidate))),
            ConditionOperator::NotIn => !self
                .list_value()?
                .iter()
                .any(|candidate| strict_equals(field_value, Some(candidate))),
            ConditionOperator::Unknown => false,
        };

        Ok(outcome)
    }

    fn list_value(&self) -> Result<&Vec<serde_json::Value>, AutomationError> {
        self.value.as_ref().and_then(|value| value.as_array()).ok_or_else(|| {
            AutomationError::InvalidCondition(format!(
                "operator {:?} on field '{}' requires an array value",
                self.operator, self.field
            ))
        })
    }
}

/// Fold the ordered condition list into a single verdict.
///
/// The running result starts at `true`. Each condition's outcome is combined
/// using the logic of the condition *before* it, so the first condition is
/// always AND-ed in and its own `logic` only connects the second one.
pub fn evaluate_conditions(
    conditions: &[Condition],
    context: &serde_json::Value,
) -> Result<bool, AutomationError> {
    let mut result = true;
    let mut connector = LogicOperator::And;

    for condition in conditions {
        let outcome = condition.evaluate(context)?;

        result = match connector {
            LogicOperator::And => result && outcome,
            LogicOperator::Or => result || outcome,
        };

        connector = condition.logic;
    }

    Ok(result)
}

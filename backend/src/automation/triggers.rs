// Automation Triggers - Domain events that start rule evaluation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Domain events a rule can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    InquiryCreated,
    InquiryStatusChanged,
    ItemAssigned,
    CostCalculated,
    ApprovalRequired,
    QuoteCreated,
    ProductionOrderCreated,
    WorkloadThreshold,
    DeadlineApproaching,
}

impl TriggerType {
    pub const ALL: [TriggerType; 9] = [
        Self::InquiryCreated,
        Self::InquiryStatusChanged,
        Self::ItemAssigned,
        Self::CostCalculated,
        Self::ApprovalRequired,
        Self::QuoteCreated,
        Self::ProductionOrderCreated,
        Self::WorkloadThreshold,
        Self::DeadlineApproaching,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InquiryCreated => "INQUIRY_CREATED",
            Self::InquiryStatusChanged => "INQUIRY_STATUS_CHANGED",
            Self::ItemAssigned => "ITEM_ASSIGNED",
            Self::CostCalculated => "COST_CALCULATED",
            Self::ApprovalRequired => "APPROVAL_REQUIRED",
            Self::QuoteCreated => "QUOTE_CREATED",
            Self::ProductionOrderCreated => "PRODUCTION_ORDER_CREATED",
            Self::WorkloadThreshold => "WORKLOAD_THRESHOLD",
            Self::DeadlineApproaching => "DEADLINE_APPROACHING",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown trigger: {s}"))
    }
}

/// Context handed to the engine: a JSON object of domain facts
pub type RuleContext = serde_json::Value;

/// Input for one trigger execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleExecution {
    pub trigger: TriggerType,
    pub context: RuleContext,
    pub user_id: Option<Uuid>,
}

impl RuleExecution {
    pub fn new(trigger: TriggerType, context: RuleContext) -> Self {
        Self {
            trigger,
            context,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }
}

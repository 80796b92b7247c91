// Automation Rule Engine
//
// Trigger -> condition -> action dispatcher for the quote workflow.
// Domain writes call the hooks, the engine evaluates the stored rules and
// the executor performs their side effects.

pub mod actions;
pub mod coerce;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod triggers;
pub mod workload;

pub use actions::{Action, EmailRecipients, EntityType};
pub use conditions::{evaluate_conditions, Condition, ConditionOperator, LogicOperator};
pub use engine::{AutomationEngine, AutomationRule, RuleResult};
pub use error::{AutomationError, AutomationResult};
pub use executor::ActionExecutor;
pub use hooks::AutomationHooks;
pub use triggers::{RuleContext, RuleExecution, TriggerType};
pub use workload::{BestEffortBalancer, WorkloadBalancer};

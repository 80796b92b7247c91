//! Automation administration API
//!
//! Rule CRUD, the read-only audit log, template seeding, manual job runs
//! and a test endpoint that fires a trigger with a caller-supplied context.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use quoteflow_shared::{AutomationLog, EmailTemplate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::automation::{
    Action, AutomationRule, Condition, ConditionOperator, RuleExecution, RuleResult, TriggerType,
};
use crate::error::ValidationBuilder;
use crate::jobs::scheduler::DEADLINE_CHECK_JOB;
use crate::jobs::JobExecutionLog;
use crate::{database, ApiError, ApiResult, AppState};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 500;
const MAX_NAME_LENGTH: usize = 200;

/// Request to create or replace a rule
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRequest {
    pub name: String,
    pub description: Option<String>,
    pub trigger: TriggerType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_by: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
}

impl LogQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT)
    }
}

/// Body of `POST /test`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTriggerRequest {
    pub trigger: TriggerType,
    #[serde(default = "empty_context")]
    pub context: serde_json::Value,
    pub user_id: Option<Uuid>,
}

fn empty_context() -> serde_json::Value {
    json!({})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedTemplatesResponse {
    pub seeded: usize,
}

pub fn automation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/:id", get(get_rule).put(update_rule).delete(delete_rule))
        .route("/rules/:id/logs", get(list_rule_logs))
        .route("/logs", get(list_logs))
        .route("/templates", get(list_templates))
        .route("/templates/defaults", post(seed_default_templates))
        .route("/deadlines/check", post(run_deadline_check))
        .route("/jobs/logs", get(list_job_logs))
        .route("/test", post(test_trigger))
        .route("/health", get(automation_health))
}

fn validate_rule(request: &RuleRequest) -> ApiResult<()> {
    let name = request.name.trim();
    let mut validation = ValidationBuilder::new()
        .check(name.is_empty(), "name", "Name is required")
        .check(
            name.chars().count() > MAX_NAME_LENGTH,
            "name",
            "Name must be at most 200 characters",
        )
        .check(request.actions.is_empty(), "actions", "At least one action is required");

    for (index, condition) in request.conditions.iter().enumerate() {
        let field = format!("conditions[{}]", index);
        validation = validation
            .check(condition.field.trim().is_empty(), &field, "Condition field is required")
            .check(
                condition.operator == ConditionOperator::Unknown,
                &field,
                "Unsupported condition operator",
            )
            .check(
                matches!(condition.operator, ConditionOperator::In | ConditionOperator::NotIn)
                    && !condition.value.as_ref().is_some_and(|value| value.is_array()),
                &field,
                "Value must be a list for in/not_in",
            );
    }

    match validation.build() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn list_rules(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<AutomationRule>>> {
    let rules = state.rules.list_rules().await?;
    Ok(Json(rules))
}

async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AutomationRule>> {
    let rule = state
        .rules
        .get_rule(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Automation rule"))?;
    Ok(Json(rule))
}

async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RuleRequest>,
) -> ApiResult<(StatusCode, Json<AutomationRule>)> {
    validate_rule(&request)?;

    let mut rule = AutomationRule::new(request.name.trim(), request.trigger, state.clock.now())
        .with_conditions(request.conditions)
        .with_actions(request.actions)
        .with_priority(request.priority);
    rule.description = request.description;
    rule.is_active = request.is_active;
    rule.created_by = request.created_by;

    state.rules.create_rule(&rule).await?;
    info!(rule_id = %rule.id, trigger = %rule.trigger, "Automation rule created");

    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RuleRequest>,
) -> ApiResult<Json<AutomationRule>> {
    validate_rule(&request)?;

    let mut rule = state
        .rules
        .get_rule(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Automation rule"))?;

    rule.name = request.name.trim().to_string();
    rule.description = request.description;
    rule.trigger = request.trigger;
    rule.conditions = request.conditions;
    rule.actions = request.actions;
    rule.priority = request.priority;
    rule.is_active = request.is_active;
    rule.updated_at = Some(state.clock.now());

    state.rules.update_rule(&rule).await?;
    info!(rule_id = %rule.id, "Automation rule updated");

    Ok(Json(rule))
}

async fn delete_rule(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    if state.rules.delete_rule(id).await? {
        info!(rule_id = %id, "Automation rule deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Automation rule"))
    }
}

async fn list_rule_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<AutomationLog>>> {
    let logs = state.rules.list_logs(Some(id), query.limit()).await?;
    Ok(Json(logs))
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<AutomationLog>>> {
    let logs = state.rules.list_logs(None, query.limit()).await?;
    Ok(Json(logs))
}

async fn list_templates(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<EmailTemplate>>> {
    let templates = state.templates.list_templates().await?;
    Ok(Json(templates))
}

async fn seed_default_templates(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SeedTemplatesResponse>> {
    let seeded = state.notifier.create_default_email_templates().await?;
    Ok(Json(SeedTemplatesResponse { seeded }))
}

async fn run_deadline_check(State(state): State<Arc<AppState>>) -> ApiResult<Json<JobExecutionLog>> {
    let log = state.scheduler.run_job_now(DEADLINE_CHECK_JOB).await?;
    Ok(Json(log))
}

async fn list_job_logs(State(state): State<Arc<AppState>>) -> Json<Vec<JobExecutionLog>> {
    Json(state.scheduler.get_execution_logs().await)
}

async fn test_trigger(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestTriggerRequest>,
) -> ApiResult<Json<Vec<RuleResult>>> {
    if !request.context.is_object() {
        return Err(ApiError::bad_request("context must be a JSON object"));
    }

    let execution = RuleExecution::new(request.trigger, request.context).with_user(request.user_id);
    let results = state.engine.execute_rules_for_trigger(execution).await;
    Ok(Json(results))
}

async fn automation_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match &state.db_pool {
        Some(pool) if database::health_check(pool).await => "connected",
        Some(_) => "unavailable",
        None => "in-memory",
    };
    let status = if database == "unavailable" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "healthy" } else { "degraded" },
            "service": "quoteflow-automation",
            "database": database,
            "emailTransport": if state.notifier.is_configured() { "smtp" } else { "console" },
        })),
    )
}

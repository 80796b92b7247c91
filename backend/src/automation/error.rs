use quoteflow_shared::UserRole;
use thiserror::Error;

use super::actions::EntityType;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid id in '{field}': {value}")]
    InvalidId { field: String, value: String },
    #[error("No active users found with role {0}")]
    NoUserForRole(UserRole),
    #[error("Action {action} does not support entity type {entity}")]
    UnsupportedEntity {
        action: &'static str,
        entity: EntityType,
    },
    #[error("Email template '{0}' not found or inactive")]
    TemplateNotFound(String),
    #[error("Email delivery failed: {0}")]
    Email(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type AutomationResult<T> = Result<T, AutomationError>;

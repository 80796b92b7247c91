// Assignee selection for role-based assignment

use async_trait::async_trait;
use quoteflow_shared::{User, UserRole};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::debug;

use super::error::{AutomationError, AutomationResult};
use crate::store::DomainStore;

/// Picks the user an ASSIGN_TO_ROLE action hands work to.
#[async_trait]
pub trait WorkloadBalancer: Send + Sync {
    async fn select_assignee(&self, role: UserRole, balance_workload: bool) -> AutomationResult<User>;
}

/// Reads current workloads and picks without any reservation, so two
/// concurrent assignments may land on the same user.
pub struct BestEffortBalancer {
    domain: Arc<dyn DomainStore>,
}

impl BestEffortBalancer {
    pub fn new(domain: Arc<dyn DomainStore>) -> Self {
        Self { domain }
    }
}

/// Lowest workload wins; the earliest candidate wins a tie.
pub fn least_loaded(candidates: &[(User, i64)]) -> Option<&User> {
    let mut best: Option<&(User, i64)> = None;
    for candidate in candidates {
        match best {
            Some((_, load)) if candidate.1 >= *load => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|(user, _)| user)
}

#[async_trait]
impl WorkloadBalancer for BestEffortBalancer {
    async fn select_assignee(&self, role: UserRole, balance_workload: bool) -> AutomationResult<User> {
        let users = self.domain.active_users_with_role(role).await?;
        if users.is_empty() {
            return Err(AutomationError::NoUserForRole(role));
        }

        if balance_workload {
            let mut candidates = Vec::with_capacity(users.len());
            for user in users {
                let workload = self.domain.user_workload(user.id).await?;
                debug!(user_id = %user.id, workload, "Candidate workload");
                candidates.push((user, workload));
            }

            return least_loaded(&candidates)
                .cloned()
                .ok_or(AutomationError::NoUserForRole(role));
        }

        let picked = {
            let mut rng = rand::thread_rng();
            users.choose(&mut rng).cloned()
        };
        picked.ok_or(AutomationError::NoUserForRole(role))
    }
}

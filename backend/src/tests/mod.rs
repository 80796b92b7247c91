pub mod unit;
pub mod integration;

// Common test utilities and shared test setup
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use crate::automation::{AutomationEngine, AutomationHooks, AutomationRule};
use crate::clock::{Clock, ManualClock};
use crate::jobs::{DeadlineTracker, JobConfig};
use crate::services::MailTransport;
use crate::store::{MemoryStore, RuleStore, TemplateStore};
use crate::{AppState, Stores};
use fixtures::RecordingTransport;

pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

/// Fully wired automation stack over one in-memory store
pub struct TestContext {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingTransport>,
    pub state: Arc<AppState>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// Same stack, but emails are only logged
    pub async fn without_transport() -> Self {
        Self::build(false).await
    }

    async fn build(with_transport: bool) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(test_start()));
        let mailer = Arc::new(RecordingTransport::default());
        let transport: Option<Arc<dyn MailTransport>> = if with_transport {
            Some(mailer.clone())
        } else {
            None
        };

        let state = AppState::build(
            Stores::memory(store.clone()),
            transport,
            clock.clone(),
            "http://quoteflow.test",
            JobConfig::default(),
            None,
        )
        .await
        .expect("Failed to build app state");

        Self {
            store,
            clock,
            mailer,
            state: Arc::new(state),
        }
    }

    pub fn engine(&self) -> &AutomationEngine {
        &self.state.engine
    }

    pub fn hooks(&self) -> AutomationHooks {
        AutomationHooks::new(self.state.engine.clone(), Arc::new(self.store.clone()))
    }

    /// A second tracker over the same store; it shares all state with the
    /// one the executor and scheduler use
    pub fn tracker(&self) -> DeadlineTracker {
        let store = Arc::new(self.store.clone());
        let clock: Arc<dyn Clock> = self.clock.clone();
        DeadlineTracker::new(store.clone(), store, clock)
    }

    pub async fn add_rule(&self, rule: AutomationRule) -> AutomationRule {
        self.store
            .create_rule(&rule)
            .await
            .expect("Failed to store rule");
        rule
    }

    pub async fn seed_templates(&self) {
        self.state
            .notifier
            .create_default_email_templates()
            .await
            .expect("Failed to seed templates");
    }

    pub async fn template_names(&self) -> Vec<String> {
        self.store
            .list_templates()
            .await
            .expect("Failed to list templates")
            .into_iter()
            .map(|t| t.name)
            .collect()
    }
}

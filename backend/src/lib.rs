use axum::{
    http::Method,
    routing::get,
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod automation;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod services;
pub mod store;

pub use error::{ApiError, ApiResult, AppError};

#[cfg(test)]
mod tests;

use automation::{ActionExecutor, AutomationEngine, AutomationHooks, BestEffortBalancer};
use clock::Clock;
use jobs::{DeadlineTracker, JobConfig, JobResult, JobScheduler};
use services::{EmailNotifier, MailTransport};
use store::{DeadlineStore, DomainStore, MemoryStore, PgStore, RuleStore, TemplateStore};

/// The four storage seams, usually backed by one store
#[derive(Clone)]
pub struct Stores {
    pub rules: Arc<dyn RuleStore>,
    pub domain: Arc<dyn DomainStore>,
    pub deadlines: Arc<dyn DeadlineStore>,
    pub templates: Arc<dyn TemplateStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            rules: store.clone(),
            domain: store.clone(),
            deadlines: store.clone(),
            templates: store,
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            rules: store.clone(),
            domain: store.clone(),
            deadlines: store.clone(),
            templates: store,
        }
    }
}

pub struct AppState {
    pub rules: Arc<dyn RuleStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub engine: Arc<AutomationEngine>,
    pub notifier: Arc<EmailNotifier>,
    pub scheduler: Arc<JobScheduler>,
    pub clock: Arc<dyn Clock>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire the engine, tracker, notifier and scheduler over `stores`.
    /// The scheduler is created but not started.
    pub async fn build(
        stores: Stores,
        transport: Option<Arc<dyn MailTransport>>,
        clock: Arc<dyn Clock>,
        app_url: &str,
        jobs: JobConfig,
        db_pool: Option<PgPool>,
    ) -> JobResult<Self> {
        let notifier = Arc::new(
            EmailNotifier::new(stores.templates.clone(), transport).with_app_url(app_url),
        );
        let tracker = Arc::new(DeadlineTracker::new(
            stores.deadlines.clone(),
            stores.domain.clone(),
            clock.clone(),
        ));
        let executor = ActionExecutor::new(
            stores.domain.clone(),
            notifier.clone(),
            tracker.clone(),
            Arc::new(BestEffortBalancer::new(stores.domain.clone())),
            clock.clone(),
        );
        let engine = Arc::new(AutomationEngine::new(stores.rules.clone(), executor, clock.clone()));
        let hooks = Arc::new(AutomationHooks::new(engine.clone(), stores.domain.clone()));
        let scheduler = Arc::new(JobScheduler::new(engine.clone(), tracker, hooks, clock.clone(), jobs).await?);

        Ok(Self {
            rules: stores.rules,
            templates: stores.templates,
            engine,
            notifier,
            scheduler,
            clock,
            db_pool,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Quoteflow Automation API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/automation", handlers::automation_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quoteflow_backend::{
    clock::SystemClock,
    config::Config,
    database,
    router,
    services::{EmailService, MailTransport},
    store::MemoryStore,
    AppState, Stores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (stores, db_pool) = match &config.database_url {
        Some(url) => {
            let pool = database::create_pool(url).await?;
            database::migrate(&pool).await?;
            (Stores::postgres(pool.clone()), Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running with the in-memory store");
            (Stores::memory(MemoryStore::new()), None)
        }
    };

    let transport: Option<Arc<dyn MailTransport>> = if config.smtp.is_configured() {
        tracing::info!("SMTP configured for {}", config.smtp.host);
        Some(Arc::new(EmailService::new(&config.smtp)?))
    } else {
        tracing::info!("SMTP not configured, emails will be logged to the console");
        None
    };

    let app_state = Arc::new(
        AppState::build(
            stores,
            transport,
            Arc::new(SystemClock),
            &config.app_url,
            config.jobs.clone(),
            db_pool,
        )
        .await?,
    );

    app_state.notifier.create_default_email_templates().await?;
    app_state.scheduler.start().await?;

    let app = router(app_state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.scheduler.shutdown().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use cartly_agent::{AgentRuntime, ConversationMemory, RuntimeOptions};
use cartly_core::config::{AppConfig, ConfigError, EmailConfig, LoadOptions};
use cartly_db::repositories::{SqlCatalogRepository, SqlSessionRepository};
use cartly_db::{connect_with_settings, migrations, DbPool};
use cartly_mail::{
    ConfirmationRenderer, EmailTransport, HttpRelayTransport, Mailer, NoopTransport, RenderError,
    RetryPolicy,
};
use cartly_tools::{
    CatalogSearchTool, CheckStockTool, OrderService, PlaceOrderTool, RecommendByAgeTool,
    SearchService, ToolRegistry,
};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("email template setup failed: {0}")]
    Templates(#[from] RenderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!("database migrations applied");

    let catalog = Arc::new(SqlCatalogRepository::new(db_pool.clone()));
    let sessions = Arc::new(SqlSessionRepository::new(db_pool.clone()));

    let mailer = Arc::new(Mailer::spawn(
        email_transport(&config.email),
        RetryPolicy {
            max_retries: config.email.max_retries,
            base_delay_ms: config.email.base_delay_ms,
            max_delay_ms: config.email.max_delay_ms,
        },
        config.email.queue_capacity,
    ));
    let renderer = Arc::new(ConfirmationRenderer::new(config.email.from_address.clone())?);

    let search = Arc::new(SearchService::new(Arc::clone(&catalog)));
    let orders = Arc::new(OrderService::new(Arc::clone(&catalog), mailer, renderer));

    let mut registry = ToolRegistry::default();
    registry.register(CatalogSearchTool::new(Arc::clone(&search)));
    registry.register(RecommendByAgeTool::new(Arc::clone(&search)));
    registry.register(CheckStockTool::new(search));
    registry.register(PlaceOrderTool::new(orders));
    info!(tools = registry.len(), "tool registry populated");

    let memory = ConversationMemory::new(sessions, config.agent.history_cap);
    let runtime = AgentRuntime::new(
        Arc::new(registry),
        memory,
        RuntimeOptions {
            dispatch_timeout: Duration::from_secs(config.agent.dispatch_timeout_secs),
            search_limit: config.agent.search_limit,
        },
    );

    Ok(Application { config, db_pool, runtime })
}

fn email_transport(email: &EmailConfig) -> Arc<dyn EmailTransport> {
    match (&email.endpoint, &email.api_key) {
        (Some(endpoint), Some(api_key)) => {
            Arc::new(HttpRelayTransport::new(endpoint.clone(), api_key.clone()))
        }
        _ => {
            info!("no email relay configured, confirmations use the noop transport");
            Arc::new(NoopTransport)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartly_core::config::ConfigOverrides;
    use cartly_core::domain::conversation::SessionId;

    fn memory_db_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations() {
        let app = bootstrap(memory_db_options()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('brands', 'categories', 'products', 'conversation_turns')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn integration_smoke_covers_seed_search_and_order() {
        let app = bootstrap(memory_db_options()).await.expect("bootstrap should succeed");
        cartly_db::seed(&app.db_pool).await.expect("seed should succeed");

        let session = SessionId("smoke".to_string());
        let found = app
            .runtime
            .handle_message(&session, "show me products under 100")
            .await
            .expect("search turn should succeed");
        assert!(found.contains("I found"), "reply was: {found}");

        let ordered = app
            .runtime
            .handle_message(&session, "buy 1 of product 1, smoke@example.com")
            .await
            .expect("order turn should succeed");
        assert!(ordered.contains("Order"), "reply was: {ordered}");

        app.db_pool.close().await;
    }
}

mod config;
mod error;
mod extract;
mod llm;
mod models;
mod prompts;
mod routes;
mod store;
mod wizard;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relief_flow::PostgresSessionStorage;

use crate::config::Config;
use crate::llm::OpenRouterModel;
use crate::routes::AppState;
use crate::store::postgres::PgDataStore;

/// Initialize structured tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relief_service=debug,relief_flow=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            // Structured JSON logging for production
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    let store = PgDataStore::new(pool.clone());
    store
        .run_migrations()
        .await
        .context("database migrations failed")?;

    let sessions = PostgresSessionStorage::from_pool(pool);
    sessions
        .ensure_table()
        .await
        .context("failed to prepare wizard session storage")?;

    let model = OpenRouterModel::new(&config.openrouter_api_key, &config.llm_model);
    info!(model = %config.llm_model, "LLM client configured");

    let state = AppState::new(Arc::new(store), Arc::new(sessions), Arc::new(model));
    let app = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "relief service listening");
    axum::serve(listener, app).await?;

    Ok(())
}

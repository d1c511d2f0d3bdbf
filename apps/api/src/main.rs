mod agent;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::agent::scoring::KeywordAtsScorer;
use crate::agent::store::{MemoryRunStore, PgRunStore, RunStore};
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Résumé Agent API v{}", env!("CARGO_PKG_VERSION"));

    // Run store: PostgreSQL when configured, in-memory otherwise
    let store: Arc<dyn RunStore> = match &config.database_url {
        Some(url) => {
            let store = PgRunStore::new(create_pool(url).await?);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, runs are kept in memory only");
            Arc::new(MemoryRunStore::new())
        }
    };

    // Initialize LLM client
    let llm = LlmClient::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.llm_max_tokens,
        config.llm_timeout,
    );
    if llm.has_credentials() {
        info!("LLM client initialized ({})", config.llm_base_url);
    } else {
        warn!("No LLM API key configured, requests must supply llm_api_key");
    }
    info!(
        "Loop defaults: max_iterations={}, target_score={}, min_iteration_gain={}",
        config.termination.max_iterations,
        config.termination.target_score,
        config.termination.min_iteration_gain
    );

    // Build app state
    let state = AppState {
        store,
        llm,
        config: config.clone(),
        scorer: Arc::new(KeywordAtsScorer),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict allowed origins once a frontend origin is configured

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ── Server entry point ───────────────────────────────────────────────────
//
// Loads process configuration (C12), opens the persistence layer (C10),
// wires up the Model Adapter (C3) and shared `EngineState`, then serves the
// HTTP binding (§6). Exit codes per SPEC_FULL.md §6: 0 on clean shutdown,
// non-zero on unhandled panic or a top-level `Result::Err`, logged via
// tracing before exit.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use narrative_engine_lib::config::EngineConfig;
use narrative_engine_lib::engine::model_adapter::ModelAdapter;
use narrative_engine_lib::engine::sessions::Db;
use narrative_engine_lib::engine::state::EngineState;
use narrative_engine_lib::engine::token_counter::TokenCounter;
use narrative_engine_lib::http;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fatal error, exiting");
        std::process::exit(1);
    }
}

async fn run() -> narrative_engine_lib::atoms::error::EngineResult<()> {
    let config = EngineConfig::load()?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Db::open(&config.database_path)?;

    let model_timeout = Duration::from_secs(config.model_timeout_secs);
    let model = ModelAdapter::placeholder(TokenCounter::heuristic(), model_timeout);

    let bind_address = config.bind_address.clone();
    let state = Arc::new(EngineState::new(config, db, model));

    let router = http::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(%bind_address, "narrative engine listening");
    axum::serve(listener, router).await?;

    Ok(())
}

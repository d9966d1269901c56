use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use tracing::{debug, info};

use common::config::AppConfig;
use common::lifecycle::Lifecycle;
use common::logger;
use ipc::{PipeServer, RequestHandler};
use storage::SqliteStore;
use storage::db;
use strategy::{FEATURE_COUNT, ScoringModel, SignalDecisionEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logger();
    let config = AppConfig::from_env()?;
    debug!("Configuration: {:?}", config);

    let pool = db::open_pool(&config.db_path)
        .await
        .with_context(|| format!("opening database {}", config.db_path))?;
    let store = Arc::new(SqliteStore::new(pool));

    // Loaded once, before any request is served.
    let scorer = ScoringModel::initialize(&config.model_path, FEATURE_COUNT);

    let handler = RequestHandler::new(
        store.clone(),
        store.clone(),
        SignalDecisionEngine::default(),
        scorer,
        Duration::days(config.lookback_days),
    );

    let lifecycle = Arc::new(Lifecycle::new());
    lifecycle.clone().spawn_signal_listener();

    let mut server = PipeServer::new(handler, config.inbound_pipe(), config.outbound_pipe());
    let result = server.run(lifecycle.signal()).await;

    store.close().await;
    let handled = result?;
    info!("Analyzer stopped after {} requests", handled);
    Ok(())
}

use std::sync::Arc;

use tracing::{error, info};

use common::config::AppConfig;
use common::lifecycle::Lifecycle;
use common::logger;
use ipc::{ShmConnection, ShmIngestor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logger();
    let config = AppConfig::from_env()?;

    let connection = match ShmConnection::connect(&config.shm_path) {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to connect to shared memory: {}", e);
            return Err(e.into());
        }
    };

    let lifecycle = Arc::new(Lifecycle::new());
    lifecycle.clone().spawn_signal_listener();

    let mut ingestor = ShmIngestor::new(connection, config.poll_interval);
    let observed = ingestor.run(lifecycle.signal()).await;
    info!("Shared memory reader exiting ({} reads with data)", observed);
    Ok(())
}

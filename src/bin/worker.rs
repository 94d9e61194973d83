use std::{sync::Arc, time::Duration};

use tokio::signal;

use fleetops::{config::AppConfig, default_handlers, init_tracing, state::AppState, Worker};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        dvla_enabled = config.dvla.is_some(),
        email_enabled = config.email.api_key.is_some(),
        "loaded fleetops configuration"
    );

    let state = Arc::new(AppState::connect(config, 1).await?);
    let worker = Worker::new(state, default_handlers(), POLL_INTERVAL);

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

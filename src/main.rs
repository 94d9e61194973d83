use anyhow::Context;
use tokio::net::TcpListener;

use fleetops::{config::AppConfig, db, init_tracing, routes::create_router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        dvla_enabled = config.dvla.is_some(),
        mot_enabled = config.mot.is_some(),
        email_enabled = config.email.api_key.is_some(),
        "loaded fleetops configuration"
    );

    let pool_size = config.database_max_pool_size;
    let state = AppState::connect(config, pool_size).await?;
    let applied = db::run_migrations(&state.pool)?;
    if applied > 0 {
        tracing::info!(applied, "applied pending migrations");
    }

    let addr = format!("{}:{}", state.config.server_host, state.config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "fleetops API listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("API received shutdown signal");
        })
        .await?;

    Ok(())
}

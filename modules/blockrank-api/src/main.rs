use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blockrank_api::{router, AppState};
use blockrank_common::Config;
use blockrank_scout::store::PgRecordStore;
use blockrank_scout::BatchUpdater;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("blockrank=info".parse()?))
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    let store = PgRecordStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let updater = BatchUpdater::from_config(&config, Arc::new(store))?;
    let app = router(Arc::new(AppState::new(updater)));

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Block rank API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

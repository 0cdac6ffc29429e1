use std::sync::Arc;

use clap::Parser;
use tally::{
    api::{ApiState, spawn_api_server},
    config::CollectorArgs,
    merge::MergeEngine,
    storage,
    util::{init_tracing, shutdown_signal},
};
use tracing::{error, info, trace};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = CollectorArgs::parse();
    let config = args.resolve()?;
    init_tracing("tally_collector", config.log_level);
    trace!("storage settings: {:?}", config.storage);

    // Key files and the listen address are checked before any state is loaded
    let api_config = config.api_config()?;

    let opened = storage::open(&config.storage).await?;
    let engine = MergeEngine::new(Arc::clone(&opened.backend));

    let server = spawn_api_server(api_config, ApiState::new(engine)).await?;
    info!("collector listening on {}", server.local_addr());

    shutdown_signal().await;

    info!("shutting down (timeout {:?})", config.shutdown_timeout);
    server.shutdown(config.shutdown_timeout).await?;

    if let Err(e) = opened.shutdown().await {
        error!("failed to close storage cleanly: {e}");
        return Err(e.into());
    }

    info!("collector stopped");
    Ok(())
}

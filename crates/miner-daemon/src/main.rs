use anyhow::Context;
use clap::Parser;
use solominer::{Config, Controller, NodeClient, RpcClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let payout = config.payout().context("resolving payout address")?;
    if payout.is_anyone_can_spend() {
        warn!("mining to an anyone-can-spend output; any observer can take the reward");
    }

    let client = RpcClient::new(config.rpc_settings()).context("creating RPC client")?;
    let height = client
        .get_block_count()
        .await
        .with_context(|| format!("connecting to node at {}", client.url()))?;
    info!(url = client.url(), height, "connected to node");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "cannot listen for ctrl-c"),
            }
        }
    });

    let mut controller = Controller::new(client, config.miner_settings(payout));
    controller.run(shutdown).await.context("mining stopped")?;

    Ok(())
}

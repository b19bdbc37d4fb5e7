//! invite-gate bot binary.
//!
//! Reads configuration from the environment (and `.env`), then long-polls the Bot API
//! until interrupted.
//!
//! Environment variables:
//! - API_TOKEN, CHANNEL_ID, ADMIN_ID, CRYPTOPAY_TOKEN: required
//! - PROVIDER_TOKEN, PRICE_USD, STARS_PRICE, CRYPTO_ASSETS: optional
//! - POLL_ATTEMPTS, POLL_INTERVAL_SECS, INVITE_TTL_SECS, NOTIFY_ON_TIMEOUT: optional
//! - RUST_LOG: log filter (default: info)

use anyhow::Context;
use invite_gate::bot::{run_polling, BotContext};
use invite_gate::config::BotConfig;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = BotConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        channel = config.channel_id,
        assets = ?config.assets,
        price_usd = config.price_usd,
        "starting invite-gate"
    );

    let (ctx, telegram) = BotContext::connect(config).context("could not build API clients")?;

    run_polling(Arc::new(ctx), telegram, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
    .context("update loop failed")?;

    Ok(())
}

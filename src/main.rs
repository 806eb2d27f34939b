//! Binary entry point.
//!
//! Wires config, logging, the venue adapters, the stream layer and the
//! detection engine together, then runs until Ctrl+C.

use std::sync::Arc;

use tracing::{info, warn};

use arb_sentry::adapters::{
    binance::Binance, bitget::Bitget, bybit::Bybit, gateio::GateIo, kucoin::Kucoin, mexc::Mexc,
    okx::Okx, Cex, CexManager, RestClient, RetryPolicy,
};
use arb_sentry::config::{logging::init_logging, Settings};
use arb_sentry::core::Engine;
use arb_sentry::dex::{DexScreener, DexSource};
use arb_sentry::notifier::{Notifier, NullNotifier, TelegramNotifier};
use arb_sentry::rate_limit::RateLimiter;
use arb_sentry::storage::{NullStore, Store, SupabaseConfig, SupabaseStore};
use arb_sentry::ws::WsManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let settings = Settings::from_env();
    info!(
        threshold = settings.arbitrage_threshold,
        interval_secs = settings.update_interval.as_secs(),
        "starting arbitrage engine"
    );

    let limiter = Arc::new(RateLimiter::new());
    let policy = RetryPolicy {
        max_retries: settings.max_retries,
        base_delay: settings.retry_delay,
    };
    let rest = || RestClient::new(Arc::clone(&limiter), policy);

    let mut adapters: Vec<Arc<dyn Cex>> = Vec::new();
    if let Some(creds) = settings.mexc.clone() {
        adapters.push(Arc::new(Mexc::new(creds, rest())));
    }
    if let Some(creds) = settings.okx.clone() {
        adapters.push(Arc::new(Okx::new(creds, rest())));
    }
    if let Some(creds) = settings.bitget.clone() {
        adapters.push(Arc::new(Bitget::new(creds, rest())));
    }
    if let Some(creds) = settings.gateio.clone() {
        adapters.push(Arc::new(GateIo::new(creds, rest())));
    }
    if let Some(creds) = settings.kucoin.clone() {
        adapters.push(Arc::new(Kucoin::new(creds, rest())));
    }
    if let Some(creds) = settings.bybit.clone() {
        adapters.push(Arc::new(Bybit::new(creds, rest())));
    }
    if let Some(creds) = settings.binance.clone() {
        adapters.push(Arc::new(Binance::new(creds, rest())));
    }

    let manager = Arc::new(CexManager::new(adapters)?);
    info!(venues = ?manager.venues(), "exchange adapters ready");

    let dex: Arc<dyn DexSource> = Arc::new(DexScreener::new(rest()));

    let notifier: Arc<dyn Notifier> = match &settings.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram)?),
        None => {
            warn!("Telegram not configured, alerts will only be logged");
            Arc::new(NullNotifier)
        }
    };

    let store: Arc<dyn Store> = match SupabaseConfig::from_env()? {
        Some(config) => Arc::new(SupabaseStore::new(config)?),
        None => Arc::new(NullStore),
    };

    let ws = Arc::new(WsManager::new());
    let stream_venues: Vec<String> = manager
        .venues()
        .iter()
        .map(|v| {
            v.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .collect();
    ws.start(&stream_venues);

    let engine = Arc::new(Engine::new(manager, dex, notifier, store, ws, &settings));

    let shutdown_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_engine.stop();
        }
    });

    engine.run().await?;
    Ok(())
}

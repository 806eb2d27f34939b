//! Detection cycle orchestration.
//!
//! The engine discovers a tradable universe, gates it on liquidity,
//! fans out price checks in batches and turns qualifying spreads into
//! persisted, notified opportunities. Any error inside one cycle is
//! logged and the loop carries on at the next interval.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::adapters::manager::VenuePrices;
use crate::adapters::CexManager;
use crate::config::Settings;
use crate::core::liquidity::LiquidityAnalyzer;
use crate::core::spread;
use crate::core::types::{LiquiditySnapshot, MarketType, Opportunity};
use crate::dex::DexSource;
use crate::error::Result;
use crate::notifier::{render_opportunity, Notifier};
use crate::storage::Store;
use crate::ws::WsManager;

const BATCH_PAUSE: Duration = Duration::from_secs(1);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Engine {
    manager: Arc<CexManager>,
    dex: Arc<dyn DexSource>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn Store>,
    ws: Arc<WsManager>,
    liquidity: LiquidityAnalyzer,
    threshold: f64,
    batch_size: usize,
    update_interval: Duration,
    trade_notional_usd: f64,
    known_tokens: Mutex<HashSet<String>>,
    stream_handles: Mutex<HashMap<String, Vec<(String, MarketType, u64)>>>,
    shutdown: broadcast::Sender<()>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: Arc<CexManager>,
        dex: Arc<dyn DexSource>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn Store>,
        ws: Arc<WsManager>,
        settings: &Settings,
    ) -> Self {
        let liquidity = LiquidityAnalyzer::new(
            Arc::clone(&manager),
            Arc::clone(&dex),
            settings.min_cex_24h_volume,
            settings.min_dex_liquidity,
        );
        let (shutdown, _) = broadcast::channel(1);
        Self {
            manager,
            dex,
            notifier,
            store,
            ws,
            liquidity,
            threshold: settings.arbitrage_threshold,
            batch_size: settings.batch_size.max(1),
            update_interval: settings.update_interval,
            trade_notional_usd: settings.trade_notional_usd,
            known_tokens: Mutex::new(HashSet::new()),
            stream_handles: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Symbols listed on every venue that also trade on-chain.
    /// Listing changes against the previous cycle are logged.
    async fn discover_universe(&self) -> Vec<String> {
        let common = self.manager.common_symbols().await;
        if common.is_empty() {
            warn!("no common symbols across venues");
            return Vec::new();
        }

        let mut universe = Vec::new();
        for symbol in common {
            if self.dex.search_token(&symbol).await.is_some() {
                universe.push(symbol);
            }
        }

        let mut known = self.known_tokens.lock().await;
        let current: HashSet<String> = universe.iter().cloned().collect();
        for symbol in current.difference(&known) {
            info!(%symbol, "new token listed on both CEX and DEX");
        }
        let removed: Vec<&String> = known.difference(&current).collect();
        if !removed.is_empty() {
            info!(?removed, "tokens no longer available");
        }
        *known = current;
        universe
    }

    /// Keep stream subscriptions aligned with the universe so the cache
    /// is warm before the price checks read it.
    async fn sync_streams(&self, universe: &[String]) {
        if !self.ws.is_running() {
            return;
        }
        let venues: Vec<String> = self
            .manager
            .venues()
            .iter()
            .map(|v| stream_venue_id(v))
            .collect();

        let mut handles = self.stream_handles.lock().await;
        let wanted: HashSet<&String> = universe.iter().collect();

        let stale: Vec<String> = handles
            .keys()
            .filter(|s| !wanted.contains(s))
            .cloned()
            .collect();
        for symbol in stale {
            if let Some(subs) = handles.remove(&symbol) {
                for (venue, market, handle) in subs {
                    self.ws.unsubscribe(&venue, &symbol, market, handle);
                }
            }
        }

        for symbol in universe {
            if handles.contains_key(symbol) {
                continue;
            }
            let mut subs = Vec::new();
            for venue in &venues {
                for market in [MarketType::Spot, MarketType::Futures] {
                    let handle =
                        self.ws
                            .subscribe(venue, symbol, market, Arc::new(|_price| {}));
                    subs.push((venue.clone(), market, handle));
                }
            }
            handles.insert(symbol.clone(), subs);
        }
    }

    /// Streamed quotes when the cache has any for this symbol, otherwise
    /// a REST fan-out.
    async fn quotes_for(&self, symbol: &str) -> HashMap<&'static str, VenuePrices> {
        if self.ws.is_running() {
            let mut quotes = HashMap::new();
            for venue in self.manager.venues() {
                let id = stream_venue_id(venue);
                let prices = VenuePrices {
                    spot: self.ws.cached_price(&id, symbol, MarketType::Spot),
                    futures: self.ws.cached_price(&id, symbol, MarketType::Futures),
                };
                if prices.spot.is_some() || prices.futures.is_some() {
                    quotes.insert(venue, prices);
                }
            }
            if !quotes.is_empty() {
                return quotes;
            }
        }
        self.manager.all_prices(symbol).await
    }

    /// Detect, gate and report for a single symbol.
    async fn check_symbol(&self, symbol: &str) {
        let quotes = self.quotes_for(symbol).await;
        if quotes.is_empty() {
            return;
        }
        let dex_data = self.dex.search_token(symbol).await;

        let Some(hit) = spread::detect(symbol, &quotes, dex_data.as_ref(), self.threshold) else {
            return;
        };

        // Liquidity is checked only after a spread clears the threshold.
        let snapshot = self.liquidity.analyze(symbol).await;
        if !snapshot.sufficient {
            debug!(
                symbol,
                spread = hit.spread_percent,
                cex_volume = snapshot.total_cex_volume_24h,
                dex_liquidity = snapshot.dex_liquidity_usd,
                "qualifying spread discarded for liquidity"
            );
            return;
        }

        let opportunity = Opportunity::new(hit, snapshot, self.trade_notional_usd);
        info!(
            symbol,
            spread = opportunity.hit.spread_percent,
            high = %opportunity.hit.high_venue,
            low = %opportunity.hit.low_venue,
            "arbitrage opportunity"
        );
        self.report(&opportunity).await;
    }

    async fn report(&self, opportunity: &Opportunity) {
        self.store.log_opportunity(opportunity).await;

        let dw_info = self
            .manager
            .deposit_withdraw_info(&opportunity.hit.symbol)
            .await;
        let high_info = dw_info.get(opportunity.hit.high_venue.as_str());
        let body = render_opportunity(opportunity, high_info);
        match self.notifier.send_message(&body).await {
            Ok(true) => {}
            Ok(false) => warn!(symbol = %opportunity.hit.symbol, "notification not delivered"),
            Err(err) => warn!(symbol = %opportunity.hit.symbol, %err, "notification failed"),
        }
    }

    /// One full detection pass.
    pub async fn run_cycle(&self) -> Result<()> {
        let universe = self.discover_universe().await;
        if universe.is_empty() {
            return Ok(());
        }
        self.sync_streams(&universe).await;

        let qualified: Vec<LiquiditySnapshot> =
            self.liquidity.high_liquidity_tokens(&universe).await;
        if qualified.is_empty() {
            debug!("no symbols passed the liquidity pre-filter");
            return Ok(());
        }
        info!(count = qualified.len(), "checking symbols with sufficient liquidity");

        let symbols: Vec<String> = qualified.into_iter().map(|s| s.symbol).collect();
        for (i, batch) in symbols.chunks(self.batch_size).enumerate() {
            let checks = batch.iter().map(|symbol| self.check_symbol(symbol));
            futures_util::future::join_all(checks).await;

            if (i + 1) * self.batch_size < symbols.len() {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }
        Ok(())
    }

    /// Run cycles until shutdown. Cleanup happens on every exit path.
    pub async fn run(&self) -> Result<()> {
        info!(
            threshold = self.threshold,
            batch_size = self.batch_size,
            interval_secs = self.update_interval.as_secs(),
            "engine starting"
        );
        self.send_startup_notification().await;

        let mut shutdown = self.shutdown.subscribe();
        loop {
            if let Err(err) = self.run_cycle().await {
                error!(%err, "detection cycle failed");
            }
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.update_interval) => {}
            }
        }

        self.cleanup().await;
        info!("engine stopped");
        Ok(())
    }

    async fn send_startup_notification(&self) {
        let mut body = format!(
            "*Arbitrage engine started*\nThreshold: {:.2}%\nInterval: {}s\nVenues: {}",
            self.threshold,
            self.update_interval.as_secs(),
            self.manager.venues().join(", "),
        );
        if let Some(stats) = self.store.summary_stats().await {
            body.push_str(&format!(
                "\nHistory: {} opportunities, avg spread {:.2}%",
                stats.total_opportunities, stats.avg_spread_percent
            ));
        }
        if let Err(err) = self.notifier.send_message(&body).await {
            warn!(%err, "startup notification failed");
        }
    }

    /// Signal the run loop to exit after the current cycle.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    async fn cleanup(&self) {
        self.ws.stop();
        let closes = async {
            self.manager.close_all().await;
            self.dex.close().await;
            self.notifier.close().await;
            self.store.close().await;
        };
        if tokio::time::timeout(CLEANUP_TIMEOUT, closes).await.is_err() {
            warn!("cleanup timed out");
        }
    }
}

/// Map a venue display name to its stream identifier.
fn stream_venue_id(venue: &str) -> String {
    venue
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_venue_id_normalizes_display_names() {
        assert_eq!(stream_venue_id("Gate.io"), "gateio");
        assert_eq!(stream_venue_id("OKX"), "okx");
        assert_eq!(stream_venue_id("BitGet"), "bitget");
        assert_eq!(stream_venue_id("MEXC"), "mexc");
    }
}

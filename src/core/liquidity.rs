//! Liquidity gating.
//!
//! A symbol qualifies when EITHER aggregate CEX volume or DEX pool depth
//! clears its floor; thin books on one side are fine as long as the
//! other side can absorb the trade.

use std::sync::Arc;

use tracing::debug;

use crate::adapters::CexManager;
use crate::core::types::LiquiditySnapshot;
use crate::dex::DexSource;

pub struct LiquidityAnalyzer {
    manager: Arc<CexManager>,
    dex: Arc<dyn DexSource>,
    min_cex_volume: f64,
    min_dex_liquidity: f64,
}

impl LiquidityAnalyzer {
    pub fn new(
        manager: Arc<CexManager>,
        dex: Arc<dyn DexSource>,
        min_cex_volume: f64,
        min_dex_liquidity: f64,
    ) -> Self {
        Self {
            manager,
            dex,
            min_cex_volume,
            min_dex_liquidity,
        }
    }

    /// CEX volume and DEX depth are fetched concurrently; the boundary
    /// counts as sufficient on both floors.
    pub async fn analyze(&self, symbol: &str) -> LiquiditySnapshot {
        let (total_cex_volume_24h, dex_data) = tokio::join!(
            self.manager.total_cex_volume(symbol),
            self.dex.search_token(symbol)
        );
        let dex_liquidity_usd = dex_data.map(|d| d.liquidity_usd).unwrap_or(0.0);

        let sufficient = total_cex_volume_24h >= self.min_cex_volume
            || dex_liquidity_usd >= self.min_dex_liquidity;
        if !sufficient {
            debug!(
                symbol,
                cex_volume = total_cex_volume_24h,
                dex_liquidity = dex_liquidity_usd,
                "insufficient liquidity"
            );
        }

        LiquiditySnapshot {
            symbol: symbol.to_string(),
            total_cex_volume_24h,
            dex_liquidity_usd,
            sufficient,
        }
    }

    /// Keep only symbols whose liquidity clears a floor.
    pub async fn high_liquidity_tokens(&self, symbols: &[String]) -> Vec<LiquiditySnapshot> {
        let mut qualified = Vec::new();
        for symbol in symbols {
            let snapshot = self.analyze(symbol).await;
            if snapshot.sufficient {
                qualified.push(snapshot);
            }
        }
        qualified
    }
}

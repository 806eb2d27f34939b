//! Shared domain types for detection and reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dex::DexTokenData;

/// Which market a quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A spread that cleared the detection threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadHit {
    pub symbol: String,
    pub market_type: MarketType,
    pub high_venue: String,
    pub high_price: f64,
    pub low_venue: String,
    pub low_price: f64,
    pub spread_percent: f64,
    /// Present only for CEX-vs-DEX hits.
    pub dex: Option<DexTokenData>,
}

/// Liquidity picture for one symbol at detection time.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquiditySnapshot {
    pub symbol: String,
    pub total_cex_volume_24h: f64,
    pub dex_liquidity_usd: f64,
    pub sufficient: bool,
}

/// A liquidity-qualified hit, ready to persist and notify.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub hit: SpreadHit,
    pub liquidity: LiquiditySnapshot,
    /// Gross profit of buying low and selling high with the configured
    /// notional, before fees.
    pub potential_profit_usd: f64,
    pub detected_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(hit: SpreadHit, liquidity: LiquiditySnapshot, notional_usd: f64) -> Self {
        let potential_profit_usd = notional_usd * hit.spread_percent / 100.0;
        Self {
            hit,
            liquidity,
            potential_profit_usd,
            detected_at: Utc::now(),
        }
    }
}

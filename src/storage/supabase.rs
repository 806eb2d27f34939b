//! Supabase (PostgREST) backed store.
//!
//! Inserts go to the `opportunities`, `trades`, `price_history` and
//! `analytics` tables through the REST endpoint with the anon key.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::types::Opportunity;
use crate::error::{AppError, Result};
use crate::storage::{Store, SummaryStats, TradeRecord};

/// Supabase connection settings from the environment.
///
/// `SUPABASE_ENABLED=false` or an unset/placeholder `SUPABASE_URL`
/// disables persistence; an enabled URL without `SUPABASE_ANON_KEY` is a
/// configuration error.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    pub fn from_env() -> Result<Option<Self>> {
        let enabled = std::env::var("SUPABASE_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        if !enabled {
            info!("persistence disabled via SUPABASE_ENABLED=false");
            return Ok(None);
        }

        let url = match std::env::var("SUPABASE_URL") {
            Ok(u) if !u.is_empty() && !u.contains("your-project") => u,
            _ => {
                debug!("SUPABASE_URL not set, persistence disabled");
                return Ok(None);
            }
        };
        if !url.starts_with("https://") {
            return Err(AppError::Config(format!("invalid SUPABASE_URL: {url}")));
        }

        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .ok()
            .filter(|k| !k.is_empty() && !k.contains("your-anon-key"))
            .ok_or_else(|| AppError::Config("SUPABASE_ANON_KEY is required".into()))?;

        info!(%url, "persistence enabled");
        Ok(Some(Self { url, anon_key }))
    }
}

pub struct SupabaseStore {
    http: reqwest::Client,
    url: String,
    anon_key: String,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Storage(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: config.url,
            anon_key: config.anon_key,
        })
    }

    async fn insert(&self, table: &str, row: serde_json::Value) {
        let endpoint = format!("{}/rest/v1/{table}", self.url);
        let result = self
            .http
            .post(&endpoint)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(table, status = %response.status(), "insert rejected");
            }
            Err(err) => {
                warn!(table, %err, "insert failed");
            }
        }
    }
}

#[async_trait]
impl Store for SupabaseStore {
    async fn log_opportunity(&self, opp: &Opportunity) {
        self.insert(
            "opportunities",
            json!({
                "token": opp.hit.symbol,
                "spread": opp.hit.spread_percent,
                "high_exchange": opp.hit.high_venue,
                "high_price": opp.hit.high_price,
                "low_exchange": opp.hit.low_venue,
                "low_price": opp.hit.low_price,
                "market_type": opp.hit.market_type.as_str(),
                "volume_24h": opp.liquidity.total_cex_volume_24h,
                "liquidity_score": opp.liquidity.dex_liquidity_usd,
                "timestamp": opp.detected_at.to_rfc3339(),
            }),
        )
        .await;
    }

    async fn log_trade(&self, trade: &TradeRecord) {
        self.insert(
            "trades",
            json!({
                "token": trade.token,
                "buy_exchange": trade.buy_venue,
                "buy_price": trade.buy_price,
                "sell_exchange": trade.sell_venue,
                "sell_price": trade.sell_price,
                "amount": trade.amount,
                "profit_usd": trade.profit_usd,
                "status": trade.status,
                "error": trade.error,
            }),
        )
        .await;
    }

    async fn log_price(&self, token: &str, venue: &str, market_type: &str, price: f64) {
        self.insert(
            "price_history",
            json!({
                "token": token,
                "exchange": venue,
                "market_type": market_type,
                "price": price,
            }),
        )
        .await;
    }

    async fn log_metric(&self, metric: &str, value: f64) {
        self.insert("analytics", json!({ "metric": metric, "value": value }))
            .await;
    }

    /// Count and average over the most recent stored spreads.
    async fn summary_stats(&self) -> Option<SummaryStats> {
        let endpoint = format!(
            "{}/rest/v1/opportunities?select=spread&order=timestamp.desc&limit=1000",
            self.url
        );
        let response = self
            .http
            .get(&endpoint)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "summary stats query rejected");
            return None;
        }

        #[derive(serde::Deserialize)]
        struct Row {
            spread: f64,
        }
        let rows: Vec<Row> = response.json().await.ok()?;
        let total = rows.len() as u64;
        let avg = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|r| r.spread).sum::<f64>() / rows.len() as f64
        };
        Some(SummaryStats {
            total_opportunities: total,
            avg_spread_percent: avg,
        })
    }

    async fn close(&self) {
        debug!("store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{LiquiditySnapshot, MarketType, SpreadHit};
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("SUPABASE_URL");
        std::env::remove_var("SUPABASE_ANON_KEY");
        std::env::remove_var("SUPABASE_ENABLED");
    }

    #[test]
    #[serial]
    fn test_unset_url_disables_persistence() {
        clear_env();
        assert!(SupabaseConfig::from_env().unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_explicit_disable_wins() {
        clear_env();
        std::env::set_var("SUPABASE_ENABLED", "false");
        std::env::set_var("SUPABASE_URL", "https://db.example.supabase.co");
        std::env::set_var("SUPABASE_ANON_KEY", "key");
        assert!(SupabaseConfig::from_env().unwrap().is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_key_is_config_error() {
        clear_env();
        std::env::set_var("SUPABASE_URL", "https://db.example.supabase.co");
        assert!(SupabaseConfig::from_env().is_err());
        clear_env();
    }

    fn opportunity() -> Opportunity {
        Opportunity::new(
            SpreadHit {
                symbol: "FOO".into(),
                market_type: MarketType::Spot,
                high_venue: "OKX".into(),
                high_price: 1.05,
                low_venue: "MEXC".into(),
                low_price: 1.0,
                spread_percent: 5.0,
                dex: None,
            },
            LiquiditySnapshot {
                symbol: "FOO".into(),
                total_cex_volume_24h: 2_000_000.0,
                dex_liquidity_usd: 0.0,
                sufficient: true,
            },
            1000.0,
        )
    }

    #[tokio::test]
    async fn test_log_opportunity_posts_row() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/opportunities")
            .match_header("apikey", "anon")
            .match_body(mockito::Matcher::PartialJson(json!({
                "token": "FOO",
                "market_type": "spot",
            })))
            .with_status(201)
            .create_async()
            .await;

        let store = SupabaseStore::new(SupabaseConfig {
            url: server.url(),
            anon_key: "anon".into(),
        })
        .unwrap();
        store.log_opportunity(&opportunity()).await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_summary_stats_averages_recent_spreads() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock(
                "GET",
                "/rest/v1/opportunities?select=spread&order=timestamp.desc&limit=1000",
            )
            .with_body(r#"[{"spread":2.0},{"spread":4.0}]"#)
            .create_async()
            .await;

        let store = SupabaseStore::new(SupabaseConfig {
            url: server.url(),
            anon_key: "anon".into(),
        })
        .unwrap();
        let stats = store.summary_stats().await.unwrap();
        assert_eq!(stats.total_opportunities, 2);
        assert_eq!(stats.avg_spread_percent, 3.0);
    }
}

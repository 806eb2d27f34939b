//! Fan-out across all configured venues.
//!
//! Every multi-venue query spawns one task per adapter and joins them
//! all; a venue that errors or has no data contributes nothing instead
//! of failing the whole query.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::adapters::{Cex, DepositWithdrawInfo};
use crate::error::{AppError, Result};

/// Spot and futures quotes from one venue. Either side may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VenuePrices {
    pub spot: Option<f64>,
    pub futures: Option<f64>,
}

/// Spot and futures listings of one venue.
#[derive(Debug, Clone, Default)]
pub struct VenueSymbols {
    pub spot: HashSet<String>,
    pub futures: HashSet<String>,
}

pub struct CexManager {
    adapters: Vec<Arc<dyn Cex>>,
    symbols_cache: RwLock<Option<Arc<HashMap<&'static str, VenueSymbols>>>>,
}

impl CexManager {
    pub fn new(adapters: Vec<Arc<dyn Cex>>) -> Result<Self> {
        if adapters.is_empty() {
            return Err(AppError::Config(
                "no exchange adapters configured; set credentials for at least one venue".into(),
            ));
        }
        debug!(count = adapters.len(), "venue manager initialized");
        Ok(Self {
            adapters,
            symbols_cache: RwLock::new(None),
        })
    }

    pub fn venues(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Spot and futures prices for `symbol` on every venue that has them.
    pub async fn all_prices(&self, symbol: &str) -> HashMap<&'static str, VenuePrices> {
        let mut tasks = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let symbol = symbol.to_string();
            tasks.push(tokio::spawn(async move {
                let name = adapter.name();
                let spot = match adapter.spot_price(&symbol).await {
                    Ok(p) => p,
                    Err(err) => {
                        warn!(venue = name, %symbol, %err, "spot price failed");
                        None
                    }
                };
                let futures = match adapter.futures_price(&symbol).await {
                    Ok(p) => p,
                    Err(err) => {
                        warn!(venue = name, %symbol, %err, "futures price failed");
                        None
                    }
                };
                (name, VenuePrices { spot, futures })
            }));
        }

        let mut out = HashMap::new();
        for task in tasks {
            if let Ok((name, prices)) = task.await {
                if prices.spot.is_some() || prices.futures.is_some() {
                    out.insert(name, prices);
                }
            }
        }
        out
    }

    /// 24h spot volume (USD) per venue.
    pub async fn volumes_24h(&self, symbol: &str) -> HashMap<&'static str, f64> {
        let mut tasks = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let symbol = symbol.to_string();
            tasks.push(tokio::spawn(async move {
                let name = adapter.name();
                match adapter.volume_24h(&symbol).await {
                    Ok(v) => (name, v),
                    Err(err) => {
                        warn!(venue = name, %symbol, %err, "volume fetch failed");
                        (name, None)
                    }
                }
            }));
        }

        let mut out = HashMap::new();
        for task in tasks {
            if let Ok((name, Some(volume))) = task.await {
                out.insert(name, volume);
            }
        }
        out
    }

    /// Sum of 24h spot volume across every venue listing the symbol.
    pub async fn total_cex_volume(&self, symbol: &str) -> f64 {
        self.volumes_24h(symbol).await.values().sum()
    }

    /// Deposit/withdraw metadata per venue.
    pub async fn deposit_withdraw_info(
        &self,
        symbol: &str,
    ) -> HashMap<&'static str, DepositWithdrawInfo> {
        let mut tasks = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let symbol = symbol.to_string();
            tasks.push(tokio::spawn(async move {
                let name = adapter.name();
                match adapter.deposit_withdraw_info(&symbol).await {
                    Ok(info) => Some((name, info)),
                    Err(err) => {
                        warn!(venue = name, %symbol, %err, "deposit/withdraw info failed");
                        None
                    }
                }
            }));
        }

        let mut out = HashMap::new();
        for task in tasks {
            if let Ok(Some((name, info))) = task.await {
                out.insert(name, info);
            }
        }
        out
    }

    /// Spot and futures listings per venue. Fetched once, then served
    /// from cache for the lifetime of the manager.
    pub async fn all_exchange_symbols(&self) -> Arc<HashMap<&'static str, VenueSymbols>> {
        if let Some(cached) = self.symbols_cache.read().await.as_ref() {
            return Arc::clone(cached);
        }

        let mut tasks = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            tasks.push(tokio::spawn(async move {
                let name = adapter.name();
                let spot = match adapter.spot_symbols().await {
                    Ok(s) => s.into_iter().collect(),
                    Err(err) => {
                        warn!(venue = name, %err, "spot symbol fetch failed");
                        HashSet::new()
                    }
                };
                let futures = match adapter.futures_symbols().await {
                    Ok(s) => s.into_iter().collect(),
                    Err(err) => {
                        warn!(venue = name, %err, "futures symbol fetch failed");
                        HashSet::new()
                    }
                };
                (name, VenueSymbols { spot, futures })
            }));
        }

        let mut map = HashMap::new();
        for task in tasks {
            if let Ok((name, symbols)) = task.await {
                map.insert(name, symbols);
            }
        }

        let map = Arc::new(map);
        *self.symbols_cache.write().await = Some(Arc::clone(&map));
        map
    }

    /// Filter to symbols listed (spot or futures) on at least two venues.
    pub async fn check_tokens_availability(&self, symbols: &[String]) -> Vec<String> {
        let listings = self.all_exchange_symbols().await;
        symbols
            .iter()
            .filter(|sym| {
                let venues = listings
                    .values()
                    .filter(|v| v.spot.contains(*sym) || v.futures.contains(*sym))
                    .count();
                venues >= 2
            })
            .cloned()
            .collect()
    }

    /// Symbols with a spot market on every configured venue.
    pub async fn common_symbols(&self) -> Vec<String> {
        let listings = self.all_exchange_symbols().await;
        let mut venues = listings.values();
        let Some(first) = venues.next() else {
            return Vec::new();
        };
        let mut common: HashSet<String> = first.spot.clone();
        for venue in venues {
            common.retain(|s| venue.spot.contains(s));
        }
        let mut out: Vec<String> = common.into_iter().collect();
        out.sort();
        out
    }

    pub async fn close_all(&self) {
        for adapter in &self.adapters {
            adapter.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::errors::{ExchangeError, ExchangeResult};
    use async_trait::async_trait;

    struct StaticVenue {
        name: &'static str,
        spot: Option<f64>,
        futures: Option<f64>,
        volume: Option<f64>,
        listings: Vec<&'static str>,
    }

    #[async_trait]
    impl Cex for StaticVenue {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn spot_price(&self, _symbol: &str) -> ExchangeResult<Option<f64>> {
            Ok(self.spot)
        }

        async fn futures_price(&self, _symbol: &str) -> ExchangeResult<Option<f64>> {
            Ok(self.futures)
        }

        async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
            Ok(self.listings.iter().map(|s| s.to_string()).collect())
        }

        async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn volume_24h(&self, _symbol: &str) -> ExchangeResult<Option<f64>> {
            Ok(self.volume)
        }

        async fn deposit_withdraw_info(
            &self,
            _symbol: &str,
        ) -> ExchangeResult<DepositWithdrawInfo> {
            Ok(DepositWithdrawInfo::default())
        }

        async fn close(&self) {}
    }

    struct BrokenVenue;

    #[async_trait]
    impl Cex for BrokenVenue {
        fn name(&self) -> &'static str {
            "Broken"
        }

        async fn spot_price(&self, _symbol: &str) -> ExchangeResult<Option<f64>> {
            Err(ExchangeError::ConnectionFailed("down".into()))
        }

        async fn futures_price(&self, _symbol: &str) -> ExchangeResult<Option<f64>> {
            Err(ExchangeError::ConnectionFailed("down".into()))
        }

        async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
            Err(ExchangeError::ConnectionFailed("down".into()))
        }

        async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
            Err(ExchangeError::ConnectionFailed("down".into()))
        }

        async fn volume_24h(&self, _symbol: &str) -> ExchangeResult<Option<f64>> {
            Err(ExchangeError::ConnectionFailed("down".into()))
        }

        async fn deposit_withdraw_info(
            &self,
            _symbol: &str,
        ) -> ExchangeResult<DepositWithdrawInfo> {
            Err(ExchangeError::ConnectionFailed("down".into()))
        }

        async fn close(&self) {}
    }

    fn manager() -> CexManager {
        CexManager::new(vec![
            Arc::new(StaticVenue {
                name: "A",
                spot: Some(1.0),
                futures: Some(1.01),
                volume: Some(500_000.0),
                listings: vec!["FOO", "BAR"],
            }),
            Arc::new(StaticVenue {
                name: "B",
                spot: Some(1.05),
                futures: None,
                volume: Some(250_000.0),
                listings: vec!["FOO", "BAZ"],
            }),
            Arc::new(BrokenVenue),
        ])
        .unwrap()
    }

    #[test]
    fn test_zero_adapters_is_config_error() {
        assert!(matches!(
            CexManager::new(Vec::new()),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_venue_is_isolated() {
        let prices = manager().all_prices("FOO").await;
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["A"].spot, Some(1.0));
        assert_eq!(prices["B"].futures, None);
        assert!(!prices.contains_key("Broken"));
    }

    #[tokio::test]
    async fn test_total_volume_sums_available_venues() {
        assert_eq!(manager().total_cex_volume("FOO").await, 750_000.0);
    }

    #[tokio::test]
    async fn test_availability_requires_two_venues() {
        let m = manager();
        let symbols = vec!["FOO".to_string(), "BAR".to_string(), "BAZ".to_string()];
        let available = m.check_tokens_availability(&symbols).await;
        assert_eq!(available, vec!["FOO"]);
    }

    #[tokio::test]
    async fn test_common_symbols_is_spot_intersection() {
        // Broken venue contributes an empty listing set, so nothing is
        // common across all three.
        assert!(manager().common_symbols().await.is_empty());

        let m = CexManager::new(vec![
            Arc::new(StaticVenue {
                name: "A",
                spot: Some(1.0),
                futures: None,
                volume: None,
                listings: vec!["FOO", "BAR"],
            }) as Arc<dyn Cex>,
            Arc::new(StaticVenue {
                name: "B",
                spot: Some(1.0),
                futures: None,
                volume: None,
                listings: vec!["BAR", "FOO", "QUX"],
            }),
        ])
        .unwrap();
        assert_eq!(m.common_symbols().await, vec!["BAR", "FOO"]);
    }

    #[tokio::test]
    async fn test_symbols_cache_serves_second_call() {
        let m = manager();
        let first = m.all_exchange_symbols().await;
        let second = m.all_exchange_symbols().await;
        assert!(Arc::ptr_eq(&first, &second));
    }
}

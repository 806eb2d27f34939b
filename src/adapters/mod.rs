//! Venue adapters for the centralized exchanges.
//!
//! Each adapter wraps one exchange's REST API behind the common [`Cex`]
//! capability set: symbol discovery, spot/futures prices, 24h volume and
//! deposit/withdraw metadata. Missing data is an explicit `Ok(None)` /
//! empty vec so the fan-out layer can proceed past individual venues.

pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod errors;
pub mod gateio;
pub mod kucoin;
pub mod manager;
pub mod mexc;
pub mod okx;
pub mod rest;

pub use errors::{ExchangeError, ExchangeResult};
pub use manager::CexManager;
pub use rest::{RestClient, RetryPolicy};

use async_trait::async_trait;

/// Deposit/withdraw metadata for one token on one venue.
///
/// Fields are optional because most venues only expose this through the
/// private API; a venue that cannot answer returns `Default::default()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositWithdrawInfo {
    pub max_volume: Option<String>,
    pub deposit_enabled: Option<bool>,
    pub withdraw_enabled: Option<bool>,
    pub withdraw_fee: Option<String>,
    pub chain: Option<String>,
}

impl DepositWithdrawInfo {
    fn status(flag: Option<bool>) -> &'static str {
        match flag {
            Some(true) => "Enabled",
            Some(false) => "Disabled",
            None => "N/A",
        }
    }

    pub fn deposit_status(&self) -> &'static str {
        Self::status(self.deposit_enabled)
    }

    pub fn withdraw_status(&self) -> &'static str {
        Self::status(self.withdraw_enabled)
    }
}

/// Pick the chain to report deposit/withdraw info for.
///
/// Tie-break order: a BSC chain first, then the first chain with deposits
/// enabled, then any chain at all.
pub(crate) fn pick_chain<T>(
    chains: &[T],
    is_bsc: impl Fn(&T) -> bool,
    deposit_enabled: impl Fn(&T) -> bool,
) -> Option<&T> {
    chains
        .iter()
        .find(|c| is_bsc(c))
        .or_else(|| chains.iter().find(|c| deposit_enabled(c)))
        .or_else(|| chains.first())
}

/// Common capability set implemented once per exchange.
///
/// Prices and volume return `Ok(None)` when the venue simply does not
/// list the symbol; errors are reserved for failures that survived the
/// retry policy.
#[async_trait]
pub trait Cex: Send + Sync {
    /// Venue identifier, e.g. "MEXC".
    fn name(&self) -> &'static str;

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>>;

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>>;

    /// Base symbols with a USDT spot market.
    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>>;

    /// Base symbols with a USDT perpetual market.
    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>>;

    /// 24h spot volume in USD terms.
    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>>;

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo>;

    /// Release the adapter's session resources. Idempotent.
    async fn close(&self);
}

/// Parse a price out of a venue's string-typed ticker field.
///
/// Venues report zero for delisted or unpriced instruments; treat that as
/// missing rather than a real quote.
pub(crate) fn parse_price(raw: &str) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(p) if p > 0.0 && p.is_finite() => Some(p),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_rejects_zero_and_garbage() {
        assert_eq!(parse_price("42.5"), Some(42.5));
        assert_eq!(parse_price("0"), None);
        assert_eq!(parse_price("0.0"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("nan"), None);
    }

    #[derive(Debug, PartialEq)]
    struct Chain {
        name: &'static str,
        deposit: bool,
    }

    fn chains() -> Vec<Chain> {
        vec![
            Chain { name: "ERC20", deposit: false },
            Chain { name: "TRC20", deposit: true },
            Chain { name: "BSC", deposit: false },
        ]
    }

    #[test]
    fn test_pick_chain_prefers_bsc() {
        let chains = chains();
        let picked = pick_chain(&chains, |c| c.name == "BSC", |c| c.deposit).unwrap();
        assert_eq!(picked.name, "BSC");
    }

    #[test]
    fn test_pick_chain_falls_back_to_deposit_enabled() {
        let chains: Vec<Chain> = chains().into_iter().filter(|c| c.name != "BSC").collect();
        let picked = pick_chain(&chains, |c| c.name == "BSC", |c| c.deposit).unwrap();
        assert_eq!(picked.name, "TRC20");
    }

    #[test]
    fn test_pick_chain_falls_back_to_first() {
        let chains = vec![Chain { name: "ERC20", deposit: false }];
        let picked = pick_chain(&chains, |c| c.name == "BSC", |c| c.deposit).unwrap();
        assert_eq!(picked.name, "ERC20");
    }

    #[test]
    fn test_deposit_withdraw_status_strings() {
        let info = DepositWithdrawInfo {
            deposit_enabled: Some(true),
            withdraw_enabled: Some(false),
            ..Default::default()
        };
        assert_eq!(info.deposit_status(), "Enabled");
        assert_eq!(info.withdraw_status(), "Disabled");
        assert_eq!(DepositWithdrawInfo::default().deposit_status(), "N/A");
    }
}

//! MEXC adapter.
//!
//! Spot: `api.mexc.com` v3 (symbols like `BTCUSDT`); futures:
//! `contract.mexc.com` v1 (symbols like `BTC_USDT`). Deposit/withdraw
//! metadata comes from the signed capital config endpoint.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::adapters::errors::ExchangeResult;
use crate::adapters::rest::RestClient;
use crate::adapters::{parse_price, pick_chain, Cex, DepositWithdrawInfo};
use crate::config::VenueCredentials;

const MARKET_KEY: &str = "mexc_market";
const PRIVATE_KEY: &str = "mexc_private";

pub struct Mexc {
    creds: VenueCredentials,
    rest: RestClient,
    spot_base: String,
    futures_base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpotTicker {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    last_price: String,
    #[serde(default)]
    volume: String,
}

#[derive(Debug, Deserialize)]
struct ContractEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractTicker {
    #[serde(default)]
    last_price: f64,
}

#[derive(Debug, Deserialize)]
struct ContractDetail {
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinConfig {
    coin: String,
    #[serde(default)]
    network_list: Vec<NetworkInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInfo {
    #[serde(default)]
    network: String,
    #[serde(default)]
    deposit_enable: bool,
    #[serde(default)]
    withdraw_enable: bool,
    #[serde(default)]
    withdraw_fee: Option<String>,
    #[serde(default)]
    withdraw_min: Option<String>,
    #[serde(default)]
    withdraw_max: Option<String>,
}

impl Mexc {
    pub fn new(creds: VenueCredentials, rest: RestClient) -> Self {
        Self::with_base(
            creds,
            rest,
            "https://api.mexc.com".into(),
            "https://contract.mexc.com".into(),
        )
    }

    pub(crate) fn with_base(
        creds: VenueCredentials,
        rest: RestClient,
        spot_base: String,
        futures_base: String,
    ) -> Self {
        Self {
            creds,
            rest,
            spot_base,
            futures_base,
        }
    }

    fn spot_symbol(symbol: &str) -> String {
        format!("{symbol}USDT")
    }

    fn futures_symbol(symbol: &str) -> String {
        format!("{symbol}_USDT")
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.creds.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl Cex for Mexc {
    fn name(&self) -> &'static str {
        "MEXC"
    }

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::spot_symbol(symbol);
        let url = format!("{}/api/v3/ticker/24hr", self.spot_base);
        let ticker: Option<SpotTicker> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        Ok(ticker.and_then(|t| parse_price(&t.last_price)))
    }

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::futures_symbol(symbol);
        let url = format!("{}/api/v1/contract/ticker", self.futures_base);
        let body: Option<ContractEnvelope<ContractTicker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        Ok(body
            .filter(|b| b.success)
            .and_then(|b| b.data)
            .map(|t| t.last_price)
            .filter(|p| *p > 0.0))
    }

    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v3/ticker/24hr", self.spot_base);
        let tickers: Option<Vec<SpotTicker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = tickers
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.symbol.strip_suffix("USDT").map(str::to_string))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "MEXC spot symbols");
        Ok(symbols)
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v1/contract/detail", self.futures_base);
        let body: Option<ContractEnvelope<Vec<ContractDetail>>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = body
            .filter(|b| b.success)
            .and_then(|b| b.data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.symbol.strip_suffix("_USDT").map(str::to_string))
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "MEXC futures symbols");
        Ok(symbols)
    }

    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::spot_symbol(symbol);
        let url = format!("{}/api/v3/ticker/24hr", self.spot_base);
        let ticker: Option<SpotTicker> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        // Base-currency volume times last price gives USD terms.
        Ok(ticker.and_then(|t| {
            let base = t.volume.parse::<f64>().ok()?;
            let last = parse_price(&t.last_price)?;
            Some(base * last)
        }))
    }

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let query = format!("recvWindow=5000&timestamp={timestamp}");
        let signature = self.sign(&query);

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.creds.api_key) {
            headers.insert("X-MEXC-APIKEY", value);
        }

        let url = format!("{}/api/v3/capital/config/getall", self.spot_base);
        let coins: Option<Vec<CoinConfig>> = self
            .rest
            .get_json(
                PRIVATE_KEY,
                &url,
                &[
                    ("recvWindow", "5000"),
                    ("timestamp", timestamp.as_str()),
                    ("signature", signature.as_str()),
                ],
                headers,
            )
            .await?;

        let Some(coin) = coins
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.coin == symbol)
        else {
            return Ok(DepositWithdrawInfo::default());
        };

        let Some(net) = pick_chain(
            &coin.network_list,
            |n| n.network.to_uppercase().contains("BSC"),
            |n| n.deposit_enable,
        ) else {
            return Ok(DepositWithdrawInfo::default());
        };

        let max_volume = match (&net.withdraw_min, &net.withdraw_max) {
            (Some(min), Some(max)) => Some(format!("{min}-{max}")),
            (_, max) => max.clone(),
        };

        Ok(DepositWithdrawInfo {
            max_volume,
            deposit_enabled: Some(net.deposit_enable),
            withdraw_enabled: Some(net.withdraw_enable),
            withdraw_fee: net.withdraw_fee.clone(),
            chain: Some(net.network.clone()),
        })
    }

    async fn close(&self) {
        debug!("MEXC adapter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rest::RetryPolicy;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn creds() -> VenueCredentials {
        VenueCredentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
            passphrase: None,
        }
    }

    fn rest() -> RestClient {
        RestClient::new(
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    fn adapter(server: &mockito::ServerGuard) -> Mexc {
        Mexc::with_base(creds(), rest(), server.url(), server.url())
    }

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(Mexc::spot_symbol("BTC"), "BTCUSDT");
        assert_eq!(Mexc::futures_symbol("BTC"), "BTC_USDT");
    }

    #[tokio::test]
    async fn test_spot_price_parses_ticker() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(mockito::Matcher::UrlEncoded("symbol".into(), "FOOUSDT".into()))
            .with_body(r#"{"symbol":"FOOUSDT","lastPrice":"1.25","volume":"1000"}"#)
            .create_async()
            .await;

        let price = adapter(&server).spot_price("FOO").await.unwrap();
        assert_eq!(price, Some(1.25));
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_none_not_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .create_async()
            .await;

        let price = adapter(&server).spot_price("NOPE").await.unwrap();
        assert!(price.is_none());
    }

    #[tokio::test]
    async fn test_futures_symbols_strip_quote_suffix() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/contract/detail")
            .with_body(
                r#"{"success":true,"data":[{"symbol":"BTC_USDT"},{"symbol":"ETH_USDT"},{"symbol":"BTC_USDC"}]}"#,
            )
            .create_async()
            .await;

        let symbols = adapter(&server).futures_symbols().await.unwrap();
        assert_eq!(symbols, vec!["BTC", "ETH"]);
    }

    #[tokio::test]
    async fn test_volume_is_base_volume_times_price() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"symbol":"FOOUSDT","lastPrice":"2.0","volume":"500"}"#)
            .create_async()
            .await;

        let volume = adapter(&server).volume_24h("FOO").await.unwrap();
        assert_eq!(volume, Some(1000.0));
    }
}

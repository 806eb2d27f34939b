//! Binance adapter. Spot (`api.binance.com`) and USDT-margined futures
//! (`fapi.binance.com`) both use `BTCUSDT`. Signed endpoints append an
//! HMAC-SHA256 hex signature to the query string.

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

const MARKET_KEY: &str = "binance_market";
const PRIVATE_KEY: &str = "binance_private";

pub struct Binance {
    creds: VenueCredentials,
    rest: RestClient,
    spot_base: String,
    futures_base: String,
}

#[derive(Debug, Deserialize)]
struct PriceTicker {
    #[serde(default)]
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayTicker {
    #[serde(default)]
    volume: String,
    #[serde(default)]
    weighted_avg_price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    #[serde(default)]
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    #[serde(default)]
    base_asset: String,
    #[serde(default)]
    quote_asset: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct CoinConfig {
    #[serde(default)]
    coin: String,
    #[serde(rename = "networkList", default)]
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
    withdraw_max: Option<String>,
}

impl Binance {
    pub fn new(creds: VenueCredentials, rest: RestClient) -> Self {
        Self::with_base(
            creds,
            rest,
            "https://api.binance.com".into(),
            "https://fapi.binance.com".into(),
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

    fn pair(symbol: &str) -> String {
        format!("{symbol}USDT")
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.creds.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn api_key_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.creds.api_key) {
            headers.insert("X-MBX-APIKEY", v);
        }
        headers
    }

    async fn symbols_from(&self, base: &str, path: &str) -> ExchangeResult<Vec<String>> {
        let url = format!("{base}{path}");
        let info: Option<ExchangeInfo> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = info
            .unwrap_or(ExchangeInfo { symbols: Vec::new() })
            .symbols
            .into_iter()
            .filter(|s| s.quote_asset == "USDT" && s.status == "TRADING")
            .map(|s| s.base_asset)
            .collect::<Vec<_>>();
        debug!(path, count = symbols.len(), "Binance symbols");
        Ok(symbols)
    }
}

#[async_trait]
impl Cex for Binance {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v3/ticker/price", self.spot_base);
        let body: Option<PriceTicker> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        Ok(body.and_then(|t| parse_price(&t.price)))
    }

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/fapi/v1/ticker/price", self.futures_base);
        let body: Option<PriceTicker> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        Ok(body.and_then(|t| parse_price(&t.price)))
    }

    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
        self.symbols_from(&self.spot_base, "/api/v3/exchangeInfo").await
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
        self.symbols_from(&self.futures_base, "/fapi/v1/exchangeInfo")
            .await
    }

    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v3/ticker/24hr", self.spot_base);
        let body: Option<DayTicker> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        // volume is base-denominated; weightedAvgPrice converts it to USD terms.
        Ok(body
            .and_then(|t| {
                let vol = t.volume.parse::<f64>().ok()?;
                let avg = t.weighted_avg_price.parse::<f64>().ok()?;
                Some(vol * avg)
            })
            .filter(|v| *v > 0.0))
    }

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let query = format!("timestamp={timestamp}");
        let signature = self.sign(&query);
        let url = format!("{}/sapi/v1/capital/config/getall", self.spot_base);
        let coins: Option<Vec<CoinConfig>> = self
            .rest
            .get_json(
                PRIVATE_KEY,
                &url,
                &[
                    ("timestamp", timestamp.as_str()),
                    ("signature", signature.as_str()),
                ],
                self.api_key_headers(),
            )
            .await?;

        let Some(coin) = coins
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.coin == symbol)
        else {
            return Ok(DepositWithdrawInfo::default());
        };

        let Some(network) = pick_chain(
            &coin.network_list,
            |n| n.network.to_uppercase() == "BSC",
            |n| n.deposit_enable,
        ) else {
            return Ok(DepositWithdrawInfo::default());
        };

        Ok(DepositWithdrawInfo {
            max_volume: network.withdraw_max.clone(),
            deposit_enabled: Some(network.deposit_enable),
            withdraw_enabled: Some(network.withdraw_enable),
            withdraw_fee: network.withdraw_fee.clone(),
            chain: Some(network.network.clone()),
        })
    }

    async fn close(&self) {
        debug!("Binance adapter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rest::RetryPolicy;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(server: &mockito::ServerGuard) -> Binance {
        let rest = RestClient::new(
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        );
        Binance::with_base(
            VenueCredentials {
                api_key: "key".into(),
                api_secret: "secret".into(),
                passphrase: None,
            },
            rest,
            server.url(),
            server.url(),
        )
    }

    #[tokio::test]
    async fn test_spot_price() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/ticker/price")
            .match_query(mockito::Matcher::UrlEncoded("symbol".into(), "FOOUSDT".into()))
            .with_body(r#"{"symbol":"FOOUSDT","price":"101.5"}"#)
            .create_async()
            .await;

        assert_eq!(adapter(&server).spot_price("FOO").await.unwrap(), Some(101.5));
    }

    #[tokio::test]
    async fn test_volume_is_base_volume_times_avg_price() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"volume":"1000","weightedAvgPrice":"2.5"}"#)
            .create_async()
            .await;

        assert_eq!(adapter(&server).volume_24h("FOO").await.unwrap(), Some(2500.0));
    }

    #[tokio::test]
    async fn test_spot_symbols_require_trading_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/exchangeInfo")
            .with_body(
                r#"{"symbols":[
                    {"baseAsset":"BTC","quoteAsset":"USDT","status":"TRADING"},
                    {"baseAsset":"OLD","quoteAsset":"USDT","status":"BREAK"},
                    {"baseAsset":"ETH","quoteAsset":"BTC","status":"TRADING"}
                ]}"#,
            )
            .create_async()
            .await;

        assert_eq!(adapter(&server).spot_symbols().await.unwrap(), vec!["BTC"]);
    }
}

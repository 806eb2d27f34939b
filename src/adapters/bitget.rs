//! BitGet adapter, v2 API. Symbols are `BTCUSDT` on both spot and
//! USDT-FUTURES; coin/chain metadata is public on this venue.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use crate::adapters::errors::ExchangeResult;
use crate::adapters::rest::RestClient;
use crate::adapters::{parse_price, pick_chain, Cex, DepositWithdrawInfo};
use crate::config::VenueCredentials;

const MARKET_KEY: &str = "bitget_market";
const PRIVATE_KEY: &str = "bitget_private";

pub struct Bitget {
    #[allow(dead_code)] // reserved for signed endpoints (not needed by v2 public metadata)
    creds: VenueCredentials,
    rest: RestClient,
    base: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Envelope<T> {
    fn ok_data(self) -> Vec<T> {
        if self.code == "00000" {
            self.data
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    last_pr: String,
    #[serde(default)]
    usdt_volume: String,
}

#[derive(Debug, Deserialize)]
struct Coin {
    #[serde(default)]
    coin: String,
    #[serde(default)]
    chains: Vec<ChainInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainInfo {
    #[serde(default)]
    chain: String,
    #[serde(default)]
    rechargeable: String,
    #[serde(default)]
    withdrawable: String,
    #[serde(default)]
    withdraw_fee: Option<String>,
}

impl Bitget {
    pub fn new(creds: VenueCredentials, rest: RestClient) -> Self {
        Self::with_base(creds, rest, "https://api.bitget.com".into())
    }

    pub(crate) fn with_base(creds: VenueCredentials, rest: RestClient, base: String) -> Self {
        Self { creds, rest, base }
    }

    fn pair(symbol: &str) -> String {
        format!("{symbol}USDT")
    }

    async fn spot_ticker(&self, symbol: &str) -> ExchangeResult<Option<Ticker>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v2/spot/market/tickers", self.base);
        let body: Option<Envelope<Ticker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        Ok(body.map(Envelope::ok_data).unwrap_or_default().into_iter().next())
    }
}

#[async_trait]
impl Cex for Bitget {
    fn name(&self) -> &'static str {
        "BitGet"
    }

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        Ok(self
            .spot_ticker(symbol)
            .await?
            .and_then(|t| parse_price(&t.last_pr)))
    }

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v2/mix/market/ticker", self.base);
        let body: Option<Envelope<Ticker>> = self
            .rest
            .get_json(
                MARKET_KEY,
                &url,
                &[("symbol", pair.as_str()), ("productType", "USDT-FUTURES")],
                HeaderMap::new(),
            )
            .await?;
        Ok(body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .first()
            .and_then(|t| parse_price(&t.last_pr)))
    }

    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v2/spot/market/tickers", self.base);
        let body: Option<Envelope<Ticker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.symbol.strip_suffix("USDT").map(str::to_string))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "BitGet spot symbols");
        Ok(symbols)
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v2/mix/market/tickers", self.base);
        let body: Option<Envelope<Ticker>> = self
            .rest
            .get_json(
                MARKET_KEY,
                &url,
                &[("productType", "USDT-FUTURES")],
                HeaderMap::new(),
            )
            .await?;
        let symbols = body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.symbol.strip_suffix("USDT").map(str::to_string))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "BitGet futures symbols");
        Ok(symbols)
    }

    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        Ok(self
            .spot_ticker(symbol)
            .await?
            .and_then(|t| t.usdt_volume.parse::<f64>().ok())
            .filter(|v| *v > 0.0))
    }

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo> {
        let url = format!("{}/api/v2/spot/public/coins", self.base);
        let body: Option<Envelope<Coin>> = self
            .rest
            .get_json(PRIVATE_KEY, &url, &[("coin", symbol)], HeaderMap::new())
            .await?;

        let Some(coin) = body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.coin == symbol)
        else {
            return Ok(DepositWithdrawInfo::default());
        };

        let Some(chain) = pick_chain(
            &coin.chains,
            |c| c.chain.to_uppercase().contains("BEP20") || c.chain.to_uppercase() == "BSC",
            |c| c.rechargeable == "true",
        ) else {
            return Ok(DepositWithdrawInfo::default());
        };

        Ok(DepositWithdrawInfo {
            max_volume: None,
            deposit_enabled: Some(chain.rechargeable == "true"),
            withdraw_enabled: Some(chain.withdrawable == "true"),
            withdraw_fee: chain.withdraw_fee.clone(),
            chain: Some(chain.chain.clone()),
        })
    }

    async fn close(&self) {
        debug!("BitGet adapter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rest::RetryPolicy;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(server: &mockito::ServerGuard) -> Bitget {
        let rest = RestClient::new(
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        );
        Bitget::with_base(
            VenueCredentials {
                api_key: "key".into(),
                api_secret: "secret".into(),
                passphrase: Some("pass".into()),
            },
            rest,
            server.url(),
        )
    }

    #[tokio::test]
    async fn test_futures_price_parses_last_pr() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v2/mix/market/ticker")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"code":"00000","data":[{"symbol":"FOOUSDT","lastPr":"12.5"}]}"#)
            .create_async()
            .await;

        assert_eq!(adapter(&server).futures_price("FOO").await.unwrap(), Some(12.5));
    }

    #[tokio::test]
    async fn test_deposit_info_reads_chain_flags() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v2/spot/public/coins")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"code":"00000","data":[{"coin":"FOO","chains":[
                    {"chain":"BEP20","rechargeable":"true","withdrawable":"false","withdrawFee":"0.1"}
                ]}]}"#,
            )
            .create_async()
            .await;

        let info = adapter(&server).deposit_withdraw_info("FOO").await.unwrap();
        assert_eq!(info.deposit_enabled, Some(true));
        assert_eq!(info.withdraw_enabled, Some(false));
        assert_eq!(info.chain.as_deref(), Some("BEP20"));
    }
}

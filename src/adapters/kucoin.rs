//! KuCoin adapter.
//!
//! Spot symbols use a dash (`BTC-USDT`); futures contracts live on a
//! separate host and append an `M` (`BTCUSDTM`). Private calls use the
//! KC-API v2 header scheme (base64 HMAC-SHA256, encrypted passphrase).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::adapters::errors::ExchangeResult;
use crate::adapters::rest::RestClient;
use crate::adapters::{parse_price, pick_chain, Cex, DepositWithdrawInfo};
use crate::config::VenueCredentials;

const MARKET_KEY: &str = "kucoin_market";
const PRIVATE_KEY: &str = "kucoin_private";

pub struct Kucoin {
    creds: VenueCredentials,
    rest: RestClient,
    spot_base: String,
    futures_base: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn ok_data(self) -> Option<T> {
        if self.code == "200000" {
            self.data
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct Level1 {
    #[serde(default)]
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketStats {
    #[serde(default)]
    vol_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    #[serde(default)]
    base_currency: String,
    #[serde(default)]
    quote_currency: String,
    #[serde(default)]
    enable_trading: bool,
}

#[derive(Debug, Deserialize)]
struct FuturesContract {
    #[serde(default)]
    symbol: String,
    #[serde(rename = "quoteCurrency", default)]
    quote_currency: String,
}

#[derive(Debug, Deserialize)]
struct FuturesTicker {
    #[serde(default)]
    price: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyDetail {
    #[serde(default)]
    chains: Vec<ChainInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainInfo {
    #[serde(default)]
    chain_name: String,
    #[serde(default)]
    is_deposit_enabled: bool,
    #[serde(default)]
    is_withdraw_enabled: bool,
    #[serde(default)]
    withdrawal_min_fee: Option<String>,
}

impl Kucoin {
    pub fn new(creds: VenueCredentials, rest: RestClient) -> Self {
        Self::with_base(
            creds,
            rest,
            "https://api.kucoin.com".into(),
            "https://api-futures.kucoin.com".into(),
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
        format!("{symbol}-USDT")
    }

    fn futures_symbol(symbol: &str) -> String {
        format!("{symbol}USDTM")
    }

    fn hmac_b64(secret: &str, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(payload.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn signed_headers(&self, method: &str, path_with_query: &str) -> HeaderMap {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::hmac_b64(
            &self.creds.api_secret,
            &format!("{timestamp}{method}{path_with_query}"),
        );
        let passphrase = Self::hmac_b64(
            &self.creds.api_secret,
            self.creds.passphrase.as_deref().unwrap_or_default(),
        );

        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: &str| {
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(name, v);
            }
        };
        put("KC-API-KEY", &self.creds.api_key);
        put("KC-API-SIGN", &signature);
        put("KC-API-TIMESTAMP", &timestamp);
        put("KC-API-PASSPHRASE", &passphrase);
        put("KC-API-KEY-VERSION", "2");
        headers
    }
}

#[async_trait]
impl Cex for Kucoin {
    fn name(&self) -> &'static str {
        "KuCoin"
    }

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::spot_symbol(symbol);
        let url = format!("{}/api/v1/market/orderbook/level1", self.spot_base);
        let body: Option<Envelope<Level1>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        Ok(body
            .and_then(Envelope::ok_data)
            .and_then(|l| parse_price(&l.price)))
    }

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let contract = Self::futures_symbol(symbol);
        let url = format!("{}/api/v1/ticker", self.futures_base);
        let body: Option<Envelope<FuturesTicker>> = self
            .rest
            .get_json(
                MARKET_KEY,
                &url,
                &[("symbol", contract.as_str())],
                HeaderMap::new(),
            )
            .await?;
        Ok(body
            .and_then(Envelope::ok_data)
            .and_then(|t| parse_price(&t.price)))
    }

    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v2/symbols", self.spot_base);
        let body: Option<Envelope<Vec<SymbolInfo>>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = body
            .and_then(Envelope::ok_data)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.quote_currency == "USDT" && s.enable_trading)
            .map(|s| s.base_currency)
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "KuCoin spot symbols");
        Ok(symbols)
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v1/contracts/active", self.futures_base);
        let body: Option<Envelope<Vec<FuturesContract>>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = body
            .and_then(Envelope::ok_data)
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.quote_currency == "USDT")
            .filter_map(|c| c.symbol.strip_suffix("USDTM").map(str::to_string))
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "KuCoin futures symbols");
        Ok(symbols)
    }

    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::spot_symbol(symbol);
        let url = format!("{}/api/v1/market/stats", self.spot_base);
        let body: Option<Envelope<MarketStats>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("symbol", pair.as_str())], HeaderMap::new())
            .await?;
        // volValue is the 24h quote-currency turnover.
        Ok(body
            .and_then(Envelope::ok_data)
            .and_then(|s| s.vol_value.parse::<f64>().ok())
            .filter(|v| *v > 0.0))
    }

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo> {
        let path = format!("/api/v3/currencies/{symbol}");
        let headers = self.signed_headers("GET", &path);
        let url = format!("{}{}", self.spot_base, path);
        let body: Option<Envelope<CurrencyDetail>> = self
            .rest
            .get_json(PRIVATE_KEY, &url, &[], headers)
            .await?;

        let detail = body.and_then(Envelope::ok_data).unwrap_or(CurrencyDetail {
            chains: Vec::new(),
        });
        let Some(chain) = pick_chain(
            &detail.chains,
            |c| c.chain_name.to_uppercase().contains("BSC"),
            |c| c.is_deposit_enabled,
        ) else {
            return Ok(DepositWithdrawInfo::default());
        };

        Ok(DepositWithdrawInfo {
            max_volume: None,
            deposit_enabled: Some(chain.is_deposit_enabled),
            withdraw_enabled: Some(chain.is_withdraw_enabled),
            withdraw_fee: chain.withdrawal_min_fee.clone(),
            chain: Some(chain.chain_name.clone()),
        })
    }

    async fn close(&self) {
        debug!("KuCoin adapter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rest::RetryPolicy;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(server: &mockito::ServerGuard) -> Kucoin {
        let rest = RestClient::new(
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        );
        Kucoin::with_base(
            VenueCredentials {
                api_key: "key".into(),
                api_secret: "secret".into(),
                passphrase: Some("pass".into()),
            },
            rest,
            server.url(),
            server.url(),
        )
    }

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(Kucoin::spot_symbol("FOO"), "FOO-USDT");
        assert_eq!(Kucoin::futures_symbol("FOO"), "FOOUSDTM");
    }

    #[tokio::test]
    async fn test_spot_price_from_level1() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/market/orderbook/level1")
            .match_query(mockito::Matcher::UrlEncoded("symbol".into(), "FOO-USDT".into()))
            .with_body(r#"{"code":"200000","data":{"price":"0.042"}}"#)
            .create_async()
            .await;

        assert_eq!(adapter(&server).spot_price("FOO").await.unwrap(), Some(0.042));
    }

    #[tokio::test]
    async fn test_futures_symbols_require_usdt_quote() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/contracts/active")
            .with_body(
                r#"{"code":"200000","data":[
                    {"symbol":"FOOUSDTM","quoteCurrency":"USDT"},
                    {"symbol":"XBTUSDM","quoteCurrency":"USD"}
                ]}"#,
            )
            .create_async()
            .await;

        assert_eq!(adapter(&server).futures_symbols().await.unwrap(), vec!["FOO"]);
    }
}

//! Gate.io adapter. Currency pairs use underscores (`BTC_USDT`) on both
//! spot and USDT-settled futures; futures live on a separate host.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use sha2::{Digest, Sha512};
use tracing::debug;

use crate::adapters::errors::ExchangeResult;
use crate::adapters::rest::RestClient;
use crate::adapters::{parse_price, pick_chain, Cex, DepositWithdrawInfo};
use crate::config::VenueCredentials;

const MARKET_KEY: &str = "gateio_market";
const PRIVATE_KEY: &str = "gateio_private";

pub struct GateIo {
    creds: VenueCredentials,
    rest: RestClient,
    spot_base: String,
    futures_base: String,
}

#[derive(Debug, Deserialize)]
struct SpotTicker {
    #[serde(default)]
    currency_pair: String,
    #[serde(default)]
    last: String,
    #[serde(default)]
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
struct FuturesTicker {
    #[serde(default)]
    contract: String,
    #[serde(default)]
    last: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyPair {
    #[serde(default)]
    base: String,
    #[serde(default)]
    quote: String,
    #[serde(default)]
    trade_status: String,
}

#[derive(Debug, Deserialize)]
struct Currency {
    #[serde(default)]
    chains: Vec<ChainInfo>,
}

#[derive(Debug, Deserialize)]
struct ChainInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    deposit_disabled: bool,
    #[serde(default)]
    withdraw_disabled: bool,
}

impl GateIo {
    pub fn new(creds: VenueCredentials, rest: RestClient) -> Self {
        Self::with_base(
            creds,
            rest,
            "https://api.gateio.ws".into(),
            "https://fx-api.gateio.ws".into(),
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
        format!("{symbol}_USDT")
    }

    /// Gate v4 signature: HMAC-SHA512 over
    /// `METHOD\npath\nquery\nSHA512(body)\ntimestamp`.
    fn signed_headers(&self, method: &str, path: &str, query: &str) -> HeaderMap {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let body_hash = hex::encode(Sha512::digest(b""));
        let payload = format!("{method}\n{path}\n{query}\n{body_hash}\n{timestamp}");
        let mut mac = Hmac::<Sha512>::new_from_slice(self.creds.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(payload.as_bytes());
        let sign = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: &str| {
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(name, v);
            }
        };
        put("KEY", &self.creds.api_key);
        put("Timestamp", &timestamp);
        put("SIGN", &sign);
        headers
    }
}

#[async_trait]
impl Cex for GateIo {
    fn name(&self) -> &'static str {
        "Gate.io"
    }

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v4/spot/tickers", self.spot_base);
        let tickers: Option<Vec<SpotTicker>> = self
            .rest
            .get_json(
                MARKET_KEY,
                &url,
                &[("currency_pair", pair.as_str())],
                HeaderMap::new(),
            )
            .await?;
        Ok(tickers
            .unwrap_or_default()
            .iter()
            .find(|t| t.currency_pair == pair)
            .and_then(|t| parse_price(&t.last)))
    }

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v4/futures/usdt/tickers", self.futures_base);
        let tickers: Option<Vec<FuturesTicker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("contract", pair.as_str())], HeaderMap::new())
            .await?;
        Ok(tickers
            .unwrap_or_default()
            .iter()
            .find(|t| t.contract == pair)
            .and_then(|t| parse_price(&t.last)))
    }

    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v4/spot/currency_pairs", self.spot_base);
        let pairs: Option<Vec<CurrencyPair>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.quote == "USDT" && p.trade_status == "tradable")
            .map(|p| p.base)
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "Gate.io spot symbols");
        Ok(symbols)
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v4/futures/usdt/tickers", self.futures_base);
        let tickers: Option<Vec<FuturesTicker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[], HeaderMap::new())
            .await?;
        let symbols = tickers
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.contract.strip_suffix("_USDT").map(str::to_string))
            .collect::<Vec<_>>();
        debug!(count = symbols.len(), "Gate.io futures symbols");
        Ok(symbols)
    }

    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v4/spot/tickers", self.spot_base);
        let tickers: Option<Vec<SpotTicker>> = self
            .rest
            .get_json(
                MARKET_KEY,
                &url,
                &[("currency_pair", pair.as_str())],
                HeaderMap::new(),
            )
            .await?;
        Ok(tickers
            .unwrap_or_default()
            .iter()
            .find(|t| t.currency_pair == pair)
            .and_then(|t| t.quote_volume.parse::<f64>().ok())
            .filter(|v| *v > 0.0))
    }

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo> {
        let path = format!("/api/v4/spot/currencies/{symbol}");
        let headers = self.signed_headers("GET", &path, "");
        let url = format!("{}{}", self.spot_base, path);
        let currency: Option<Currency> = self
            .rest
            .get_json(PRIVATE_KEY, &url, &[], headers)
            .await?;

        let currency = currency.unwrap_or(Currency { chains: Vec::new() });
        let Some(chain) = pick_chain(
            &currency.chains,
            |c| c.name.to_uppercase() == "BSC",
            |c| !c.deposit_disabled,
        ) else {
            return Ok(DepositWithdrawInfo::default());
        };

        Ok(DepositWithdrawInfo {
            max_volume: None,
            deposit_enabled: Some(!chain.deposit_disabled),
            withdraw_enabled: Some(!chain.withdraw_disabled),
            withdraw_fee: None,
            chain: Some(chain.name.clone()),
        })
    }

    async fn close(&self) {
        debug!("Gate.io adapter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rest::RetryPolicy;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(server: &mockito::ServerGuard) -> GateIo {
        let rest = RestClient::new(
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        );
        GateIo::with_base(
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
    async fn test_spot_price_matches_exact_pair() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v4/spot/tickers")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"[{"currency_pair":"FOO_USDT","last":"0.5","quote_volume":"12000"},
                    {"currency_pair":"FOOBAR_USDT","last":"9.9","quote_volume":"1"}]"#,
            )
            .create_async()
            .await;

        let price = adapter(&server).spot_price("FOO").await.unwrap();
        assert_eq!(price, Some(0.5));
    }

    #[tokio::test]
    async fn test_spot_symbols_filters_tradable_usdt_pairs() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v4/spot/currency_pairs")
            .with_body(
                r#"[{"base":"BTC","quote":"USDT","trade_status":"tradable"},
                    {"base":"ETH","quote":"BTC","trade_status":"tradable"},
                    {"base":"OLD","quote":"USDT","trade_status":"untradable"}]"#,
            )
            .create_async()
            .await;

        let symbols = adapter(&server).spot_symbols().await.unwrap();
        assert_eq!(symbols, vec!["BTC"]);
    }
}

//! Bybit adapter, on the unified v5 market API. Spot and linear
//! perpetuals share the `BTCUSDT` symbol format and differ only in the
//! `category` parameter.

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

const MARKET_KEY: &str = "bybit_market";
const PRIVATE_KEY: &str = "bybit_private";

pub struct Bybit {
    creds: VenueCredentials,
    rest: RestClient,
    base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    #[serde(default)]
    ret_code: i64,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    last_price: String,
    #[serde(default)]
    turnover24h: String,
}

#[derive(Debug, Deserialize)]
struct RowsResult {
    #[serde(default)]
    rows: Vec<CoinInfo>,
}

#[derive(Debug, Deserialize)]
struct CoinInfo {
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
    chain_deposit: String,
    #[serde(default)]
    chain_withdraw: String,
    #[serde(default)]
    withdraw_fee: Option<String>,
    #[serde(default)]
    remain_amount: Option<String>,
}

impl Bybit {
    pub fn new(creds: VenueCredentials, rest: RestClient) -> Self {
        Self::with_base(creds, rest, "https://api.bybit.com".into())
    }

    pub(crate) fn with_base(creds: VenueCredentials, rest: RestClient, base: String) -> Self {
        Self { creds, rest, base }
    }

    fn pair(symbol: &str) -> String {
        format!("{symbol}USDT")
    }

    async fn ticker(&self, category: &str, symbol: &str) -> ExchangeResult<Option<Ticker>> {
        let pair = Self::pair(symbol);
        let url = format!("{}/v5/market/tickers", self.base);
        let body: Option<Envelope<ListResult<Ticker>>> = self
            .rest
            .get_json(
                MARKET_KEY,
                &url,
                &[("category", category), ("symbol", pair.as_str())],
                HeaderMap::new(),
            )
            .await?;
        Ok(body
            .filter(|b| b.ret_code == 0)
            .and_then(|b| b.result)
            .and_then(|r| r.list.into_iter().next()))
    }

    async fn symbols(&self, category: &str) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/v5/market/tickers", self.base);
        let body: Option<Envelope<ListResult<Ticker>>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("category", category)], HeaderMap::new())
            .await?;
        let symbols = body
            .filter(|b| b.ret_code == 0)
            .and_then(|b| b.result)
            .map(|r| r.list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.symbol.strip_suffix("USDT").map(str::to_string))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        debug!(category, count = symbols.len(), "Bybit symbols");
        Ok(symbols)
    }

    /// v5 signing: HMAC-SHA256 hex over `timestamp + api_key + recv_window + query`.
    fn signed_headers(&self, query: &str) -> HeaderMap {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let recv_window = "5000";
        let payload = format!("{timestamp}{}{recv_window}{query}", self.creds.api_key);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.creds.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: &str| {
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(name, v);
            }
        };
        put("X-BAPI-API-KEY", &self.creds.api_key);
        put("X-BAPI-TIMESTAMP", &timestamp);
        put("X-BAPI-RECV-WINDOW", recv_window);
        put("X-BAPI-SIGN", &signature);
        headers
    }
}

#[async_trait]
impl Cex for Bybit {
    fn name(&self) -> &'static str {
        "Bybit"
    }

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        Ok(self
            .ticker("spot", symbol)
            .await?
            .and_then(|t| parse_price(&t.last_price)))
    }

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        Ok(self
            .ticker("linear", symbol)
            .await?
            .and_then(|t| parse_price(&t.last_price)))
    }

    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
        self.symbols("spot").await
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
        self.symbols("linear").await
    }

    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        // turnover24h is quote-denominated, i.e. already USD terms.
        Ok(self
            .ticker("spot", symbol)
            .await?
            .and_then(|t| t.turnover24h.parse::<f64>().ok())
            .filter(|v| *v > 0.0))
    }

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo> {
        let query = format!("coin={symbol}");
        let headers = self.signed_headers(&query);
        let url = format!("{}/v5/asset/coin/query-info", self.base);
        let body: Option<Envelope<RowsResult>> = self
            .rest
            .get_json(PRIVATE_KEY, &url, &[("coin", symbol)], headers)
            .await?;

        let Some(coin) = body
            .filter(|b| b.ret_code == 0)
            .and_then(|b| b.result)
            .and_then(|r| r.rows.into_iter().find(|c| c.coin == symbol))
        else {
            return Ok(DepositWithdrawInfo::default());
        };

        let Some(chain) = pick_chain(
            &coin.chains,
            |c| c.chain.to_uppercase() == "BSC",
            |c| c.chain_deposit == "1",
        ) else {
            return Ok(DepositWithdrawInfo::default());
        };

        Ok(DepositWithdrawInfo {
            max_volume: chain.remain_amount.clone(),
            deposit_enabled: Some(chain.chain_deposit == "1"),
            withdraw_enabled: Some(chain.chain_withdraw == "1"),
            withdraw_fee: chain.withdraw_fee.clone(),
            chain: Some(chain.chain.clone()),
        })
    }

    async fn close(&self) {
        debug!("Bybit adapter closed");
    }
}
